use std::path::Path;

use anyhow::{Context, Result};

use noitlink_core::{Config, ControlClient};

fn client(config: &Config) -> Result<ControlClient> {
    ControlClient::new(&config.daemon, config.retry.policy())
        .context("Failed to create control client")
}

fn read_check(file: &Path) -> Result<String> {
    std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read check XML from {}", file.display()))
}

pub async fn get(config: &Config, uuid: &str, raw: bool) -> Result<()> {
    let client = client(config)?;
    if raw {
        println!("{}", client.get_check(uuid).await?);
    } else {
        let check = client.get_check_definition(uuid).await?;
        println!("{}", serde_json::to_string_pretty(&check)?);
    }
    Ok(())
}

pub async fn list(config: &Config) -> Result<()> {
    let mut uuids: Vec<String> = client(config)?.get_all_checks().await?.into_iter().collect();
    uuids.sort();
    for uuid in uuids {
        println!("{}", uuid);
    }
    Ok(())
}

pub async fn set(config: &Config, uuid: &str, file: &Path) -> Result<()> {
    let xml = read_check(file)?;
    client(config)?.set_check(uuid, &xml).await?;
    println!("Check {} saved", uuid);
    Ok(())
}

pub async fn delete(config: &Config, uuid: &str) -> Result<()> {
    client(config)?.delete_check(uuid).await?;
    println!("Check {} deleted", uuid);
    Ok(())
}

pub async fn test(config: &Config, uuid: &str, file: &Path) -> Result<()> {
    let xml = read_check(file)?;
    let state = client(config)?.test_check(uuid, &xml).await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

pub async fn version(config: &Config) -> Result<()> {
    let version = client(config)?.get_version().await?;
    println!("{}", version);
    Ok(())
}
