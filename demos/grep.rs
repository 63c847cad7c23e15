use std::{
    fs::File,
    io::{BufRead, BufReader},
};

use anyhow::Result;
use clap::Parser;
use dfaregex::Regex;

#[derive(Parser)]
struct Cli {
    pattern: String,
    file: String,
    /// Pattern flags, e.g. "im".
    #[arg(short, long, default_value = "")]
    flags: String,
    /// Print the matched part of each line instead of the whole line.
    #[arg(short = 'o', long)]
    only_matching: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Cli::parse();

    let file = File::open(args.file)?;
    let reader = BufReader::new(file);
    let re = Regex::with_flags(&args.pattern, &args.flags)?;

    for line in reader.lines() {
        let line = line?;
        let Some(range) = re.find(&line) else {
            continue;
        };
        if args.only_matching {
            let matched: String = line
                .chars()
                .skip(range.start)
                .take(range.len())
                .collect();
            println!("{matched}");
        } else {
            println!("{line}");
        }
    }

    Ok(())
}
