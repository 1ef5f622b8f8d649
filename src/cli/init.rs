//! Init command - write the example user config

use anyhow::Result;
use console::style;

use redstring::config::UserConfig;

/// Run the init command
pub fn run() -> Result<()> {
    let existed = UserConfig::user_config_path().is_some_and(|p| p.exists());
    let config_path = UserConfig::init_user_config()?;

    if existed {
        println!(
            "{} Config already exists at {}",
            style("✓").green(),
            style(config_path.display()).cyan()
        );
    } else {
        println!(
            "{} Created {}",
            style("✓").green(),
            style(config_path.display()).cyan()
        );
    }

    let config = UserConfig::load()?;
    println!("  Bridge: {}", style(config.bridge_url()).dim());
    println!("  AI:     {}", style(config.ai_url()).dim());
    println!("  Data:   {}", style(config.data_dir().display()).dim());
    Ok(())
}
