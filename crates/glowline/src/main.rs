mod cli;
mod mainloop;
mod run;
mod scene;

use anyhow::Result;

fn main() -> Result<()> {
    let args = cli::parse();
    run::run(args)
}
