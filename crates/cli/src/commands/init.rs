//! `chatbridge init`: Write a default config file.

use std::path::Path;

use chatbridge_config::AppConfig;

pub async fn run(config_path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(p) => p.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };

    println!("chatbridge — First-Time Setup");
    println!("=============================\n");

    if let Some(dir) = config_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("✅ Created config directory: {}", dir.display());
        }
    }

    if config_path.exists() && !force {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or re-run with --force.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\nNext steps:");
    println!("   1. Set OPENAI_API_KEY, LINE_CHANNEL_ACCESS_TOKEN and LINE_CHANNEL_SECRET");
    println!("   2. Put persona.txt, menu.json and store.json next to where you run the server");
    println!("   3. Run: chatbridge check");
    println!("   4. Run: chatbridge serve\n");

    Ok(())
}
