//! CLI module for the nextblog binary
//!
//! Dispatches subcommands: running the server, minting tokens and
//! maintaining the note index.
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::Mutex;

use crate::{
    serve, Commands, Config, NoteIndex, NoteStorage, RebuildIndexSummary, Result, TokenAuthority,
};

/// CLI Application handler - processes commands against the note store
pub struct App {
    /// The note storage backend
    note_storage: Arc<Mutex<NoteStorage>>,

    /// Application configuration
    config: Config,

    /// Whether to display verbose output
    verbose: bool,
}

impl App {
    pub fn new(note_storage: Arc<Mutex<NoteStorage>>, config: Config, verbose: bool) -> Self {
        Self {
            note_storage,
            config,
            verbose,
        }
    }

    /// Run the given command to completion
    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Serve { bind } => {
                let mut config = self.config.clone();
                if let Some(bind) = bind {
                    config.bind_addr = bind;
                }
                serve(config, Arc::clone(&self.note_storage)).await?
            }

            Commands::Token { email } => self.handle_token(email)?,

            Commands::Reindex => self.handle_reindex().await?,

            Commands::Stats { json } => self.handle_stats(json).await?,
        }

        Ok(())
    }

    fn handle_token(&self, email: Option<String>) -> Result<()> {
        let email = email.unwrap_or_else(|| self.config.admin_email.clone());
        let authority = TokenAuthority::from_config(&self.config)?;
        let token = authority.issue(&email)?;
        info!("Issued token for {}", email);
        println!("{}", token);
        Ok(())
    }

    async fn handle_reindex(&self) -> Result<()> {
        let storage = self.note_storage.lock().await;
        let summary = storage.rebuild_index()?;
        self.print_reindex_summary(&summary);
        Ok(())
    }

    fn print_reindex_summary(&self, summary: &RebuildIndexSummary) {
        println!(
            "Indexed {} notes from {} shard files.",
            summary.notes_indexed, summary.shards_scanned
        );
        if !summary.shards_skipped.is_empty() {
            warn!("{} shard files were skipped", summary.shards_skipped.len());
            println!("Skipped {} unreadable shards:", summary.shards_skipped.len());
            for (shard, reason) in &summary.shards_skipped {
                println!("  {}: {}", shard, reason);
            }
        }
    }

    async fn handle_stats(&self, json: bool) -> Result<()> {
        let index = self.note_storage.lock().await.read_index()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&index)?);
            return Ok(());
        }
        self.display_stats_text(&index);
        Ok(())
    }

    fn display_stats_text(&self, index: &NoteIndex) {
        let public = index.files.values().flatten().filter(|m| m.is_public).count();
        println!(
            "{} notes ({} public) in {} shards",
            index.note_count(),
            public,
            index.files.len()
        );

        if !index.tagged.is_empty() {
            let mut tags: Vec<(&String, &usize)> = index.tagged.iter().collect();
            tags.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            println!("\nTags:");
            for (tag, count) in tags {
                println!("  {:<24} {}", tag, count);
            }
        }

        if self.verbose {
            println!("\nShards:");
            for (shard, metas) in index.files.iter().rev() {
                println!("  {}  {}", shard, metas.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_in(dir: &std::path::Path) -> App {
        let config = Config {
            notes_dir: dir.to_path_buf(),
            ..Config::default()
        };
        let storage = NoteStorage::new(config.clone());
        storage.initialize().unwrap();
        App::new(Arc::new(Mutex::new(storage)), config, true)
    }

    #[tokio::test]
    async fn reindex_restores_a_deleted_index() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path());
        {
            let storage = app.note_storage.lock().await;
            storage
                .create_note("hello".into(), true, vec!["x".into()])
                .unwrap();
        }
        std::fs::remove_file(dir.path().join("index.json")).unwrap();

        app.run(Commands::Reindex).await.unwrap();

        let index = app.note_storage.lock().await.read_index().unwrap();
        assert_eq!(index.note_count(), 1);
        assert_eq!(index.tagged.get("x"), Some(&1));
    }

    #[tokio::test]
    async fn token_and_stats_commands_succeed_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path());
        app.run(Commands::Token { email: None }).await.unwrap();
        app.run(Commands::Stats { json: false }).await.unwrap();
        app.run(Commands::Stats { json: true }).await.unwrap();
    }
}
