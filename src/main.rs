mod app;
mod config;
mod credentials;
mod dashboard;
mod event;
mod jira;
mod pager;
mod redirect;
mod relay;
mod report;
mod search;
mod ui;
mod worklog;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use config::Config;
use credentials::{CredentialStore, LocalStore};
use dashboard::{Dashboard, ReportState};
use jira::{Credential, JiraClient, RelayClient, SearchRequest, TrackerGateway};
use report::{Report, ReportWindow};
use search::{build_filter, SearchDebouncer};
use worklog::{format_duration, running_totals, WorklogMutator, WorklogPanel};

#[derive(Parser, Debug)]
#[command(name = "jtk")]
#[command(about = "Jira relay, worklog panel and monthly effort reports")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/jtk/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run the HTTP relay
  Serve {
    #[arg(long)]
    bind: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
  },
  /// Verify and store Jira credentials
  Connect {
    /// Jira site, e.g. acme.atlassian.net
    #[arg(short, long)]
    domain: String,
    #[arg(short, long)]
    email: String,
    /// API token (default: $JTK_JIRA_TOKEN or $JIRA_API_TOKEN)
    #[arg(short, long)]
    token: Option<String>,
  },
  /// Forget stored credentials
  Disconnect,
  /// Show the stored connection
  Status,
  /// Monthly effort and closure report
  Report {
    /// Month as YYYY-MM (default: current month)
    #[arg(short, long)]
    month: Option<String>,
    /// Also report this many months before it, newest first
    #[arg(short = 'n', long, default_value_t = 1)]
    months: u32,
  },
  /// Search issues by key or summary text
  Search { text: String },
  /// Issue picker suggestions
  Pick { query: String },
  /// Read or add worklogs
  Worklog {
    #[command(subcommand)]
    command: WorklogCommand,
  },
  /// Interactive worklog panel
  Panel,
  /// Follow the redirects of a (shortened) URL
  Resolve { url: String },
}

#[derive(Subcommand, Debug)]
enum WorklogCommand {
  /// Worklog history of an issue with running totals
  List { issue: String },
  /// Log time on an issue
  Add {
    issue: String,
    minutes: String,
    /// YYYY-MM-DD or YYYY.MM.DD (default: today)
    #[arg(short, long)]
    date: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _guard = init_tracing(&config, matches!(args.command, Command::Panel))?;

  match args.command {
    Command::Serve { bind, port } => {
      let bind = bind.unwrap_or(config.relay.bind);
      let port = port.unwrap_or(config.relay.port);
      relay::serve(&bind, port).await
    }
    Command::Connect {
      domain,
      email,
      token,
    } => {
      let token = match token {
        Some(token) => token,
        None => Config::get_api_token()?,
      };
      let gateway = gateway(&config)?;
      let mut store = CredentialStore::new(LocalStore::open()?)?;
      let cred = store
        .connect(gateway.as_ref(), &domain, &email, &token, false)
        .await?;
      println!("Connected to {} as {}", cred.host, cred.label());
      Ok(())
    }
    Command::Disconnect => {
      let mut store = CredentialStore::new(LocalStore::open()?)?;
      store.disconnect().await?;
      println!("Disconnected");
      Ok(())
    }
    Command::Status => {
      let store = CredentialStore::new(LocalStore::open()?)?;
      match store.current() {
        Some(cred) => {
          println!("Host:  {}", cred.host);
          println!("User:  {} <{}>", cred.label(), cred.email);
          println!("Token: sha256:{}", cred.fingerprint());
          println!("Remembered remotely: {}", store.is_remembered());
        }
        None => println!("Not connected. Run `jtk connect`."),
      }
      match &config.client.relay_url {
        Some(url) => println!("Relay: {}", url),
        None => println!("Relay: none (direct)"),
      }
      Ok(())
    }
    Command::Report { month, months } => {
      let window = match month {
        Some(month) => ReportWindow::parse(&month)?,
        None => ReportWindow::current(),
      };
      let mut dashboard = Dashboard::new(gateway(&config)?, current_credential()?, window);
      for i in 0..months.max(1) {
        if i == 0 {
          dashboard.refresh();
        } else {
          println!();
          dashboard.set_window(dashboard.window().previous());
        }
        loop {
          tokio::time::sleep(Duration::from_millis(50)).await;
          if dashboard.poll() {
            break;
          }
        }
        match dashboard.state() {
          ReportState::Ready(report) => print_report(report),
          ReportState::Failed(err) => {
            return Err(eyre!("Report for {} failed: {}", dashboard.window(), err))
          }
          ReportState::Idle | ReportState::Loading => {
            return Err(eyre!("Report for {} did not complete", dashboard.window()))
          }
        }
      }
      Ok(())
    }
    Command::Search { text } => {
      let request = SearchRequest::new(build_filter(&text))
        .with_fields(&["summary", "status"])
        .with_page(0, 10);
      let page = gateway(&config)?
        .search(&current_credential()?, &request)
        .await?;
      for issue in page.issues {
        println!("{:<12} {:<14} {}", issue.key, issue.status, issue.summary);
      }
      Ok(())
    }
    Command::Pick { query } => {
      let picked = gateway(&config)?
        .pick_issues(&current_credential()?, &query)
        .await?;
      for issue in picked {
        println!("{:<12} {}", issue.key, issue.summary);
      }
      Ok(())
    }
    Command::Worklog { command } => {
      let mutator = WorklogMutator::new(gateway(&config)?, current_credential()?);
      let (issue, entries) = match command {
        WorklogCommand::List { issue } => {
          let entries = mutator.history(&issue).await?;
          (issue, entries)
        }
        WorklogCommand::Add {
          issue,
          minutes,
          date,
        } => {
          let date = date.unwrap_or_else(today);
          let entries = mutator.add_entry(&issue, &minutes, &date).await?;
          println!("{} — {}m logged", issue.to_uppercase(), minutes.trim());
          (issue, entries)
        }
      };
      let totals = running_totals(&entries);
      println!("{} worklogs on {}", totals.len(), issue.to_uppercase());
      for total in totals {
        println!(
          "{}  {:<20} {:>8} {:>9}",
          total.entry.started.format("%Y-%m-%d %H:%M"),
          total.entry.author,
          format_duration(total.entry.time_spent_seconds),
          format_duration(total.cumulative_seconds),
        );
      }
      Ok(())
    }
    Command::Panel => {
      let gateway = gateway(&config)?;
      let cred = current_credential()?;
      let search = SearchDebouncer::new(gateway.clone(), cred.clone())
        .with_delay(config.client.search_delay());
      let panel = WorklogPanel::new(search, WorklogMutator::new(gateway, cred.clone()));

      let mut app = app::App::new(panel, cred.label(), &today());
      app.run().await
    }
    Command::Resolve { url } => {
      let chain = redirect::RedirectResolver::new()?.resolve(&url).await?;
      if chain.hops.is_empty() {
        println!("{} (no redirect)", chain.final_url);
      } else {
        for (i, hop) in chain.hops.iter().enumerate() {
          println!("{:>2}. {}", i, hop);
        }
      }
      Ok(())
    }
  }
}

/// The panel owns the terminal, so it logs to a daily file instead of stderr.
fn init_tracing(config: &Config, to_file: bool) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(&config.log.level))
    .map_err(|e| eyre!("Invalid log level {:?}: {}", config.log.level, e))?;

  if !to_file {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    return Ok(None);
  }

  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("jtk")
    .join("logs");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
    &log_dir, "jtk.log",
  ));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();
  Ok(Some(guard))
}

/// Relay client when a relay is configured, direct Jira access otherwise.
fn gateway(config: &Config) -> Result<Arc<dyn TrackerGateway>> {
  let gateway: Arc<dyn TrackerGateway> = match &config.client.relay_url {
    Some(url) => Arc::new(RelayClient::new(url.as_str())),
    None => Arc::new(JiraClient::new()?),
  };
  Ok(gateway)
}

fn current_credential() -> Result<Credential> {
  let store = CredentialStore::new(LocalStore::open()?)?;
  store
    .current()
    .cloned()
    .ok_or_else(|| eyre!("Not connected. Run `jtk connect` first."))
}

fn today() -> String {
  Local::now().format("%Y-%m-%d").to_string()
}

fn print_report(report: &Report) {
  println!("Report for {}", report.window);
  println!();
  println!("Hours by project ({:.1}h total)", report.total_hours);
  for effort in &report.project_effort {
    println!("  {:<12} {:>6.1}h", effort.project, effort.hours);
  }
  println!();
  println!("Closed tickets ({})", report.total_closed);
  for count in &report.status_counts {
    println!("  {:<18} {:>4}", count.status, count.count);
  }
  println!();
  println!("Recently closed");
  for ticket in &report.recent_closures {
    let resolved = ticket
      .resolved_at
      .map(|t| t.format("%Y-%m-%d").to_string())
      .unwrap_or_else(|| "-".to_string());
    println!(
      "  {:<12} {:<10} {:<16} {}",
      ticket.key,
      resolved,
      ticket.status,
      ui::truncate(&ticket.summary, 50)
    );
  }
}
