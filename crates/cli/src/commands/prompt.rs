//! `chatbridge prompt`: Print the system prompt the model will receive.

use std::path::Path;

use chatbridge_core::persona::Persona;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let persona = Persona::load(&config.persona.paths())?;
    println!("{}", persona.system_prompt);
    Ok(())
}
