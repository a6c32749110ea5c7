//! `chatbridge check`: Validate config and reference data.

use std::path::Path;

use chatbridge_core::Provider;
use chatbridge_core::persona::Persona;
use chatbridge_providers::OpenAiCompatProvider;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("chatbridge check");
    println!("================\n");

    let mut issues = 0;

    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ {e}");
            return Err("configuration is invalid".into());
        }
    };

    if config.has_api_key() {
        println!("  ✅ API key configured");
        let provider = OpenAiCompatProvider::from_config(&config)?;
        match provider.health_check().await {
            Ok(true) => println!("  ✅ Completion API reachable at {}", provider.base_url()),
            Ok(false) => {
                println!("  ⚠️  Completion API at {} rejected the key", provider.base_url());
                issues += 1;
            }
            Err(e) => {
                println!("  ⚠️  Completion API unreachable: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  ⚠️  No API key configured — set OPENAI_API_KEY");
        issues += 1;
    }

    match (&config.line.channel_access_token, &config.line.channel_secret) {
        (Some(_), Some(_)) => println!("  ✅ LINE credentials configured"),
        (None, _) => {
            println!("  ⚠️  No LINE channel access token — replies cannot be sent");
            issues += 1;
        }
        (_, None) => {
            println!("  ⚠️  No LINE channel secret — webhook signatures will not be verified");
            issues += 1;
        }
    }

    match Persona::load(&config.persona.paths()) {
        Ok(persona) => {
            println!("  ✅ Reference data loaded: {}", persona.diagnostic_summary());
            for path in &persona.loaded_files {
                println!("       {path}");
            }
        }
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
