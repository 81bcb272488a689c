//! Output formatting for the CLI

use anyhow::Result;
use inventory_service::ItemDetails;
use inventory_storage_sqlite::{Item, SettingsRecord};
use serde_json::json;

/// Prints command results as text or JSON
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print one item with every field
    pub fn print_item(&self, item: &Item) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(item)?);
            return Ok(());
        }

        let details = ItemDetails::from_item(item);
        println!("ID:             {}", details.id);
        println!("Name:           {}", details.name);
        println!("Price:          {}", details.formatted_price());
        println!("Quantity:       {}", details.quantity);
        if item.is_out_of_stock() {
            println!("                (out of stock)");
        }
        println!("Supplier:       {}", details.supplier_name);
        println!("Supplier email: {}", details.supplier_email);
        println!("Supplier phone: {}", details.supplier_phone);
        Ok(())
    }

    /// Print the item list
    pub fn print_items(&self, items: &[Item]) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(items)?);
            return Ok(());
        }

        if items.is_empty() {
            println!("No items.");
            return Ok(());
        }
        for item in items {
            let details = ItemDetails::from_item(item);
            println!(
                "{:>5} | {:<30} | {:>10} | {:>6}",
                details.id,
                truncate(&details.name, 30),
                details.formatted_price(),
                details.quantity
            );
        }
        println!("\n{} item(s)", items.len());
        Ok(())
    }

    /// Print the stored settings
    pub fn print_settings(&self, settings: &SettingsRecord) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(settings)?);
            return Ok(());
        }

        println!("Default supplier name:  {}", settings.default_shipper_name);
        println!("Default supplier email: {}", settings.default_shipper_email);
        println!("Default supplier phone: {}", settings.default_shipper_phone);
        println!("Prefill new items:      {}", settings.enable_default_fields);
        println!("Hide sensitive data:    {}", settings.hide_sensitive_data);
        println!("Sharing enabled:        {}", settings.enable_sharing);
        Ok(())
    }

    /// Print share text, or note that sharing is off
    pub fn print_share(&self, text: Option<&str>) -> Result<()> {
        if self.json {
            println!("{}", json!({ "shared": text.is_some(), "text": text }));
        } else {
            match text {
                Some(text) => println!("{}", text),
                None => println!("Sharing is disabled in settings."),
            }
        }
        Ok(())
    }

    /// Print a short confirmation
    pub fn success(&self, message: &str, id: Option<i64>) {
        if self.json {
            println!("{}", json!({ "ok": true, "message": message, "id": id }));
        } else {
            println!("{}", message);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
