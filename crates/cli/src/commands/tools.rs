//! `linvoice tools`: list the built-in tools.

use linvoice_memory::UserContext;

pub async fn run() -> anyhow::Result<()> {
    let config = super::load_config()?;
    let registry = linvoice_tools::default_registry(&config.tools, UserContext::in_memory().shared());

    println!("{} tools available\n", registry.len());
    for schema in registry.all_schemas() {
        println!("  {}", schema.signature());
        println!("      {}", schema.description);
    }
    Ok(())
}
