use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;

use layoutsync_core::{Layout, LayoutId, LayoutStorage, LayoutUpdate, NewLayout};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum LayoutCommand {
    /// List all layouts
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a layout by ID
    Show {
        /// Layout ID
        id: LayoutId,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Create a new layout
    Create {
        /// Layout name
        name: String,

        /// Layout data as JSON
        #[arg(long, conflicts_with = "file")]
        data: Option<String>,

        /// Read layout data from a JSON file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Update a layout
    Update {
        /// Layout ID
        id: LayoutId,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New layout data as JSON
        #[arg(long, conflicts_with = "file")]
        data: Option<String>,

        /// Read new layout data from a JSON file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Delete a layout
    Delete {
        /// Layout ID
        id: LayoutId,
    },
}

impl LayoutCommand {
    /// True for commands that only read layouts.
    pub fn is_read(&self) -> bool {
        matches!(self, LayoutCommand::List { .. } | LayoutCommand::Show { .. })
    }

    pub async fn run(&self, storage: &dyn LayoutStorage) -> Result<(), Box<dyn std::error::Error>> {
        match self {
            LayoutCommand::List { format } => {
                let layouts = storage.list_layouts().await?;
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&layouts)?),
                    OutputFormat::Text => {
                        if layouts.is_empty() {
                            println!("No layouts found.");
                        }
                        for layout in &layouts {
                            println!("{}  {}", layout.id, layout.name);
                        }
                    }
                }
            }

            LayoutCommand::Show { id, format } => {
                let layout = storage
                    .get_layout(*id)
                    .await?
                    .ok_or_else(|| format!("Layout not found: {}", id))?;
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&layout)?),
                    OutputFormat::Text => print_layout(&layout)?,
                }
            }

            LayoutCommand::Create { name, data, file } => {
                let data = read_data(data.as_deref(), file.as_ref())?
                    .unwrap_or_else(|| serde_json::json!({}));
                let layout = storage
                    .save_new_layout(NewLayout::new(name.clone(), data))
                    .await?;
                println!("Created layout {} ({})", layout.name, layout.id);
            }

            LayoutCommand::Update {
                id,
                name,
                data,
                file,
            } => {
                let data = read_data(data.as_deref(), file.as_ref())?;
                if name.is_none() && data.is_none() {
                    return Err("Nothing to update: pass --name, --data or --file".into());
                }
                let layout = storage
                    .update_layout(LayoutUpdate {
                        id: *id,
                        name: name.clone(),
                        data,
                    })
                    .await?;
                println!("Updated layout {} ({})", layout.name, layout.id);
            }

            LayoutCommand::Delete { id } => {
                if storage.get_layout(*id).await?.is_none() {
                    return Err(format!("Layout not found: {}", id).into());
                }
                storage.delete_layout(*id).await?;
                println!("Deleted layout {}", id);
            }
        }

        Ok(())
    }
}

fn read_data(
    data: Option<&str>,
    file: Option<&PathBuf>,
) -> Result<Option<serde_json::Value>, Box<dyn std::error::Error>> {
    let raw = match (data, file) {
        (Some(data), _) => data.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?,
        (None, None) => return Ok(None),
    };
    let value = serde_json::from_str(&raw).map_err(|e| format!("Invalid layout JSON: {}", e))?;
    Ok(Some(value))
}

fn print_layout(layout: &Layout) -> Result<(), serde_json::Error> {
    println!("ID:       {}", layout.id);
    println!("Name:     {}", layout.name);
    println!("Updated:  {}", layout.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!();
    println!("{}", serde_json::to_string_pretty(&layout.data)?);
    Ok(())
}
