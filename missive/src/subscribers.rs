//! Subscriber records and suppressed addresses kept in JSON files between
//! runs.

use std::{collections::BTreeMap, ops::ControlFlow, path::Path};

use missive_common::{Subscriber, SubscriberStatus};
use missive_store::{MemorySubscriberStore, MemorySuppressionList, SubscriberStore};

/// Load a store from `path`. A missing file gives an empty store.
///
/// # Errors
///
/// If the file exists but cannot be read or parsed.
pub async fn load(path: &Path) -> anyhow::Result<MemorySubscriberStore> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(MemorySubscriberStore::new());
        }
        Err(e) => anyhow::bail!("Failed to read subscribers from {}: {e}", path.display()),
    };

    let subscribers: Vec<Subscriber> = serde_json::from_str(&content)?;
    Ok(MemorySubscriberStore::with_subscribers(subscribers))
}

/// Write every record in `store` to `path`, pending ones first.
///
/// # Errors
///
/// If the store cannot be scanned or the file cannot be written.
pub async fn save(store: &dyn SubscriberStore, path: &Path) -> anyhow::Result<()> {
    let mut all = Vec::new();
    for status in [SubscriberStatus::Pending, SubscriberStatus::Verified] {
        store
            .scan(status, &mut |page| {
                all.extend(page);
                ControlFlow::Continue(())
            })
            .await?;
    }

    tokio::fs::write(path, serde_json::to_vec_pretty(&all)?).await?;
    Ok(())
}

/// Load suppressed addresses from `path`, a JSON object of address to
/// reason. A missing file gives an empty list.
///
/// # Errors
///
/// If the file exists but cannot be read or parsed.
pub async fn load_suppressions(path: &Path) -> anyhow::Result<MemorySuppressionList> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(MemorySuppressionList::new());
        }
        Err(e) => anyhow::bail!("Failed to read suppressions from {}: {e}", path.display()),
    };

    let entries: BTreeMap<String, String> = serde_json::from_str(&content)?;
    Ok(MemorySuppressionList::with_entries(entries))
}

/// Write every suppressed address in `list` to `path`.
///
/// # Errors
///
/// If the file cannot be written.
pub async fn save_suppressions(list: &MemorySuppressionList, path: &Path) -> anyhow::Result<()> {
    tokio::fs::write(path, serde_json::to_vec_pretty(&list.entries())?).await?;
    Ok(())
}
