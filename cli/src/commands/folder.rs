use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use larder_core::db::Database;

use super::helpers::{exit_not_found, truncate};

pub(crate) fn cmd_folder_create(
    db: &Database,
    name: &str,
    parent_id: Option<i64>,
    json: bool,
) -> Result<()> {
    let folder = db.create_folder(name, parent_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&folder)?);
    } else {
        println!("Created folder: {} (id: {})", folder.name, folder.id);
    }
    Ok(())
}

pub(crate) fn cmd_folder_list(db: &Database, parent_id: Option<i64>, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct FolderRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Subfolders")]
        children: usize,
        #[tabled(rename = "Recipes")]
        recipes: usize,
    }

    if let Some(parent_id) = parent_id {
        db.get_folder(parent_id)?;
    }
    let folders = db.list_folders(parent_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&folders)?);
        return Ok(());
    }
    if folders.is_empty() {
        println!("No folders");
        return Ok(());
    }

    let rows = folders
        .iter()
        .map(|f| {
            Ok(FolderRow {
                id: f.id,
                name: truncate(&f.name, 30),
                children: db.list_folders(Some(f.id))?.len(),
                recipes: db.list_recipes(Some(f.id))?.len(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_folder_delete(db: &Database, id: i64, json: bool) -> Result<()> {
    if !db.delete_folder(id)? {
        exit_not_found(&format!("Folder {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted folder {id}");
    }
    Ok(())
}
