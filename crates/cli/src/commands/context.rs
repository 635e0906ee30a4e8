//! `linvoice context`: inspect and edit the persisted user context.

pub async fn show(json: bool) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let context = super::load_user_context(&config);

    if json {
        println!("{}", serde_json::to_string_pretty(&context.export())?);
        return Ok(());
    }

    println!("User context ({})", config.user_context.resolved_path().display());
    println!("==================");
    let summary = context.context_summary();
    if summary.is_empty() {
        println!("  Nothing stored yet.");
    } else {
        for line in summary.lines() {
            println!("  {line}");
        }
    }
    println!("  Facts:   {}", context.fact_count());
    Ok(())
}

pub async fn set_pref(category: &str, key: &str, value: &str) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let mut context = super::load_user_context(&config);
    context.set_preference(category, key, value);
    context.persist()?;
    println!("  Saved {category}.{key} = {value}");
    Ok(())
}

pub async fn set_info(key: &str, value: &str) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let mut context = super::load_user_context(&config);
    context.set_user_info(key, value);
    context.persist()?;
    println!("  Saved {key} = {value}");
    Ok(())
}

pub async fn clear(confirm: bool) -> anyhow::Result<()> {
    if !confirm {
        println!("  This deletes everything the assistant remembers about you.");
        println!("  Run with --confirm to proceed:");
        println!("  linvoice context clear --confirm");
        return Ok(());
    }

    let config = super::load_config()?;
    let mut context = super::load_user_context(&config);
    context.clear();
    context.persist()?;
    println!("  User context cleared.");
    Ok(())
}
