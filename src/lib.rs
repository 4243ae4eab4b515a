/*
 * This file is part of idracfan.
 *
 * Copyright (C) 2025 idracfan contributors
 *
 * idracfan is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * idracfan is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with idracfan. If not, see <https://www.gnu.org/licenses/>.
 */

//! idracfan - operator tooling for iDRAC fan control
//!
//! One-shot commands against the BMC: inspect sensors, hand fan control to
//! or from the firmware, pin a fixed duty cycle. The closed-loop controller
//! itself lives in the `idracfand` daemon.

pub mod cli;
pub mod status;
