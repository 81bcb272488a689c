//! Command handlers

use crate::output::Output;
use anyhow::{anyhow, bail, Context, Result};
use futures::StreamExt;
use inventory_service::{InventoryApp, SettingsViewState};
use inventory_storage_sqlite::{Item, SettingsField};
use std::path::PathBuf;

/// Fields accepted by `item add`
pub struct NewItem {
    pub name: String,
    pub price: f64,
    pub quantity: i64,
    pub supplier_name: Option<String>,
    pub supplier_email: Option<String>,
    pub supplier_phone: Option<String>,
}

pub async fn add_item(app: &InventoryApp, new: NewItem, output: &Output) -> Result<()> {
    let mut item = app.new_item(new.name, new.price, new.quantity)?;
    if let Some(name) = new.supplier_name {
        item.supplier_name = name;
    }
    if let Some(email) = new.supplier_email {
        item.supplier_email = email;
    }
    if let Some(phone) = new.supplier_phone {
        item.supplier_phone = phone;
    }

    let id = app.repository().insert_item(item).await?;
    output.success(&format!("Added item {}", id), Some(id));
    Ok(())
}

pub async fn list_items(app: &InventoryApp, output: &Output) -> Result<()> {
    let mut items = app.repository().get_all_items_stream()?;
    let current = items
        .next()
        .await
        .ok_or_else(|| anyhow!("item store closed"))??;
    output.print_items(&current)
}

pub async fn show_item(app: &InventoryApp, id: i64, output: &Output) -> Result<()> {
    let item = find(app, id).await?;
    output.print_item(&item)
}

pub async fn sell_item(app: &InventoryApp, id: i64, output: &Output) -> Result<()> {
    find(app, id).await?;
    if app.item_details(id).reduce_quantity_by_one().await? {
        output.success(&format!("Sold one unit of item {}", id), Some(id));
    } else {
        output.success(&format!("Item {} is out of stock", id), Some(id));
    }
    Ok(())
}

pub async fn delete_item(app: &InventoryApp, id: i64, output: &Output) -> Result<()> {
    let item = find(app, id).await?;
    app.repository().delete_item(item).await?;
    output.success(&format!("Deleted item {}", id), Some(id));
    Ok(())
}

pub async fn share_item(app: &InventoryApp, id: i64, output: &Output) -> Result<()> {
    let text = app.item_details(id).share().await?;
    output.print_share(text.as_deref())
}

pub async fn export_item(
    app: &InventoryApp,
    id: i64,
    destination: PathBuf,
    output: &Output,
) -> Result<()> {
    app.item_details(id)
        .save_to_file(&destination)
        .await
        .with_context(|| format!("exporting item {} to {}", id, destination.display()))?;
    output.success(&format!("Exported item {} to {}", id, destination.display()), Some(id));
    Ok(())
}

pub fn decrypt_export(app: &InventoryApp, path: PathBuf, output: &Output) -> Result<()> {
    let item = app
        .read_export(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    output.print_item(&item)
}

pub fn show_settings(app: &InventoryApp, output: &Output) -> Result<()> {
    output.print_settings(&app.settings().load()?)
}

/// Apply `key=value` assignments to the settings form and save it
pub async fn set_settings(
    app: &InventoryApp,
    assignments: &[String],
    output: &Output,
) -> Result<()> {
    let view = app.settings_view()?;
    for assignment in assignments {
        let (field, value) = parse_assignment(assignment)?;
        apply(&view, field, value)?;
    }

    view.save().await?;
    output.success("Settings saved", None);
    Ok(())
}

async fn find(app: &InventoryApp, id: i64) -> Result<Item> {
    app.repository()
        .get_item(id)
        .await?
        .ok_or_else(|| anyhow!("no item with id {}", id))
}

/// Split `key=value`; the key is a preference key such as `share_key`
pub fn parse_assignment(assignment: &str) -> Result<(SettingsField, &str)> {
    let (key, value) = assignment
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got '{}'", assignment))?;
    let field = SettingsField::from_key(key.trim()).ok_or_else(|| {
        let known: Vec<&str> = SettingsField::ALL.iter().map(|f| f.key()).collect();
        anyhow!("unknown setting '{}' (known: {})", key, known.join(", "))
    })?;
    Ok((field, value))
}

fn apply(view: &SettingsViewState, field: SettingsField, value: &str) -> Result<()> {
    let flag = || -> Result<bool> {
        match value.trim() {
            "true" | "on" | "1" => Ok(true),
            "false" | "off" | "0" => Ok(false),
            other => bail!("{} expects true or false, got '{}'", field, other),
        }
    };

    match field {
        SettingsField::DefaultShipperName => view.on_name_change(value),
        SettingsField::DefaultShipperEmail => view.on_email_change(value),
        SettingsField::DefaultShipperPhone => view.on_phone_change(value),
        SettingsField::EnableDefaultFields => view.on_enable_default_fields_change(flag()?),
        SettingsField::HideSensitiveData => view.on_hide_sensitive_data_change(flag()?),
        SettingsField::EnableSharing => view.on_enable_sharing_change(flag()?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        let (field, value) = parse_assignment("share_key=true").unwrap();
        assert_eq!(field, SettingsField::EnableSharing);
        assert_eq!(value, "true");

        let (field, value) = parse_assignment("supplier_email_key=a=b@c.io").unwrap();
        assert_eq!(field, SettingsField::DefaultShipperEmail);
        assert_eq!(value, "a=b@c.io");
    }

    #[test]
    fn test_parse_assignment_errors() {
        assert!(parse_assignment("share_key").is_err());

        let err = parse_assignment("colour=red").unwrap_err().to_string();
        assert!(err.contains("unknown setting 'colour'"));
        assert!(err.contains("sensitive_data_key"));
    }
}
