use miette::Result;
use modfactory_core::version_string;

pub fn run() -> Result<()> {
    println!("{}", version_string());
    Ok(())
}
