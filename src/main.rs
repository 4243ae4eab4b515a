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

use std::sync::Arc;

use clap::Parser;
use idf_core::{locate_tool, IpmiExecutor, IpmiTool};

use idracfan::cli::{self, Cli};

fn main() {
    let cli_args = Cli::parse();

    // Only log when asked; normal output goes to stdout
    if let Ok(filter) = std::env::var("IDRACFAN_LOG") {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }

    if let Err(e) = run(&cli_args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli_args: &Cli) -> anyhow::Result<()> {
    let config = cli_args.config()?;
    let program = locate_tool(&config.ipmitool)?;
    let executor: Arc<dyn IpmiExecutor> = Arc::new(IpmiTool::new(program, config.command_timeout));

    let output = cli::execute(cli_args, executor.as_ref(), &config)?;
    println!("{}", output);
    Ok(())
}
