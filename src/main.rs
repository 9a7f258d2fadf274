//! bkup - command line client for the bkup backup server
//!
//! Every subcommand is a single stateless request on its own connection.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use bkup::cli::{Args, Command};
use bkup::config::{ClientConfig, LogFormat, Settings, SETTINGS_FILE};
use bkup::logger::{self, Logger};
use bkup::{Client, ClientId};

/// Id used by the demonstration sequence when none is given.
const DEMO_UID: u32 = 1111;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    // Set up Ctrl-C handler
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // Exit immediately with 130 (128 + SIGINT)
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let args = Args::parse();
    init_logging(args.verbose);

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(|| args.dir.join(SETTINGS_FILE));
    let mut settings = Settings::load(&settings_path)?;
    if let Some(ref p) = args.log_file {
        settings.log_file = Some(p.clone());
    }
    if args.json_log {
        settings.log_format = LogFormat::Json;
    }

    let config = ClientConfig::from_dir(&args.dir).with_settings(settings);
    let logger = logger::from_settings(&config.settings);

    let run = Runner {
        config,
        logger,
        show_progress: !args.no_progress,
    };

    match args.command {
        Command::List => run.list(resolve_uid(args.uid)),
        Command::Backup { file: Some(name), .. } => run.backup(resolve_uid(args.uid), &name),
        Command::Backup { file: None, .. } => run.backup_all(resolve_uid(args.uid)),
        Command::Fetch { name, save_as } => run.fetch(resolve_uid(args.uid), &name, &save_as),
        Command::Delete { name } => run.delete(resolve_uid(args.uid), &name),
        Command::Demo => run.demo(ClientId(args.uid.unwrap_or(DEMO_UID))),
    }
}

fn resolve_uid(uid: Option<u32>) -> ClientId {
    uid.map(ClientId).unwrap_or_else(ClientId::random)
}

struct Runner {
    config: ClientConfig,
    logger: Arc<dyn Logger>,
    show_progress: bool,
}

impl Runner {
    /// A fresh client per request; nothing carries over between them.
    fn client(&self, uid: ClientId) -> Client {
        println!("\nClient id: {}", uid);
        Client::new(Some(uid), self.config.clone())
            .with_logger(self.logger.clone())
            .with_progress(self.show_progress)
    }

    fn list(&self, uid: ClientId) -> Result<()> {
        println!("Requesting list of backed up files..");
        let listing = self
            .client(uid)
            .list_files()
            .context("Error while trying to get the list of files")?;
        println!(
            "Backed up files ({} entries, listing {}):",
            listing.entries.len(),
            listing.name
        );
        for entry in &listing.entries {
            println!("  {}", entry);
        }
        Ok(())
    }

    fn backup(&self, uid: ClientId, name: &str) -> Result<()> {
        println!("Backing up: {}", name);
        let outcome = self
            .client(uid)
            .backup_file(name)
            .with_context(|| format!("Error while backing up {}", name))?;
        println!("File uploaded successfully ({} bytes).", outcome.stats.bytes);
        Ok(())
    }

    fn backup_all(&self, uid: ClientId) -> Result<()> {
        if self.config.backup_list.is_empty() {
            bail!("backup list is empty, nothing to back up");
        }
        let results = self.client(uid).backup_all();
        let mut failed = 0;
        for (name, result) in &results {
            match result {
                Ok(outcome) => println!("  ok    {} ({} bytes)", name, outcome.stats.bytes),
                Err(e) => {
                    failed += 1;
                    println!("  error {}: {}", name, e);
                }
            }
        }
        if failed > 0 {
            bail!("{} of {} backups failed", failed, results.len());
        }
        Ok(())
    }

    fn fetch(&self, uid: ClientId, name: &str, save_as: &Path) -> Result<()> {
        println!("Requesting: {} from the server..", name);
        let outcome = self
            .client(uid)
            .fetch_file(name, save_as)
            .with_context(|| format!("Can't get the file {}", name))?;
        println!(
            "Received file in size of: {} bytes, saved as {}",
            outcome.stats.bytes,
            outcome.saved_as.display()
        );
        if let Some(m) = outcome.mismatch {
            println!(
                "Warning: Mismatch. Received {} bytes, local copy has {} bytes.",
                m.received, m.local
            );
        }
        Ok(())
    }

    fn delete(&self, uid: ClientId, name: &str) -> Result<()> {
        println!("Requesting to erase: {}", name);
        self.client(uid)
            .delete_file(name)
            .with_context(|| format!("Error while erasing {}", name))?;
        println!("Erased {}.", name);
        Ok(())
    }

    /// List, back up the first two files, list again, fetch the first one,
    /// delete it, then try to fetch it again. Each step is its own request
    /// and a failing step does not stop the sequence.
    fn demo(&self, uid: ClientId) -> Result<()> {
        let list = &self.config.backup_list;
        if list.len() < 2 {
            bail!("the demonstration needs at least two files in backup.info");
        }
        let (first, second) = (list[0].as_str(), list[1].as_str());

        report("list", self.list(uid));
        report("backup", self.backup(uid, first));
        report("backup", self.backup(uid, second));
        report("list", self.list(uid));
        report("fetch", self.fetch(uid, first, Path::new("tmp")));
        report("delete", self.delete(uid, first));
        report("fetch", self.fetch(uid, first, Path::new("tmp2")));
        Ok(())
    }
}

fn report(step: &str, result: Result<()>) {
    if let Err(e) = result {
        eprintln!("{} failed: {:#}", step, e);
    }
}
