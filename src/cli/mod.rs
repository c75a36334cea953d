mod inspect;
mod serve;
mod watch;

use anyhow::{Context, Result};
use console::style;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::config::DashboardConfig;
use crate::core::poller::DEFAULT_POLL_INTERVAL;
use crate::core::terminal::{self, GuideSection, print_error};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Server")
        .command("serve", "Run the telemetry API server")
        .command("snapshot", "Build one telemetry snapshot and print it as JSON")
        .command("invoke", "Invoke a single gateway tool and print the outcome")
        .print();

    GuideSection::new("Client")
        .command("watch", "Poll a running server and show live agent activity")
        .print();

    GuideSection::new("Options")
        .command("--config <file>", "TOML config (serve, snapshot, invoke)")
        .command("--api-host <host>", "Bind address for serve")
        .command("--api-port <port>", "Port for serve")
        .command("--api-url <url>", "Server to poll in watch mode")
        .command("--interval <secs>", "Poll interval in watch mode (default 4)")
        .command("--filter <text>", "Only show matching sessions and tool calls")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("gatewatch").green()
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ServeFlags {
    pub api_host: Option<String>,
    pub api_port: Option<u16>,
    pub config: Option<PathBuf>,
}

pub(crate) fn parse_serve_flags(args: &[String], start: usize) -> ServeFlags {
    let mut flags = ServeFlags::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-port" => {
                if i + 1 < args.len() {
                    flags.api_port = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-host" => {
                if i + 1 < args.len() {
                    flags.api_host = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    flags.config = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    flags
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WatchFlags {
    pub api_url: String,
    pub interval: Duration,
    pub filter: String,
}

pub(crate) fn default_api_url() -> String {
    let defaults = DashboardConfig::default();
    format!("http://{}:{}", defaults.api_host, defaults.api_port)
}

pub(crate) fn parse_watch_flags(args: &[String], start: usize) -> WatchFlags {
    let mut flags = WatchFlags {
        api_url: default_api_url(),
        interval: DEFAULT_POLL_INTERVAL,
        filter: String::new(),
    };
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-url" => {
                if i + 1 < args.len() {
                    flags.api_url = args[i + 1].trim_end_matches('/').to_string();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--interval" | "-i" => {
                if i + 1 < args.len() {
                    if let Ok(secs) = args[i + 1].parse::<f64>()
                        && secs.is_finite()
                        && secs > 0.0
                    {
                        flags.interval = Duration::from_secs_f64(secs);
                    }
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--filter" | "-f" => {
                if i + 1 < args.len() {
                    flags.filter = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    flags
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InvokeArgs {
    pub tool: String,
    pub args: Value,
    pub config: Option<PathBuf>,
}

/// `invoke <tool> [json-args] [--config F]`
pub(crate) fn parse_invoke_args(args: &[String], start: usize) -> Result<InvokeArgs> {
    let mut positional = Vec::new();
    let mut config = None;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            other => {
                positional.push(other.to_string());
                i += 1;
            }
        }
    }

    let mut positional = positional.into_iter();
    let tool = positional
        .next()
        .filter(|t| !t.trim().is_empty())
        .context("invoke needs a tool name, e.g. `gatewatch invoke sessions_list`")?;
    let args = match positional.next() {
        Some(raw) => {
            let parsed: Value = serde_json::from_str(&raw)
                .with_context(|| format!("Tool arguments are not valid JSON: {}", raw))?;
            if !parsed.is_object() {
                anyhow::bail!("Tool arguments must be a JSON object");
            }
            parsed
        }
        None => Value::Object(Default::default()),
    };
    Ok(InvokeArgs { tool, args, config })
}

/// Loads config from file and environment, then applies serve flags on top.
pub(crate) fn load_config(flags: &ServeFlags) -> Result<DashboardConfig> {
    let mut config = DashboardConfig::load(flags.config.as_deref())?;
    if let Some(host) = flags.api_host.as_ref().filter(|h| !h.trim().is_empty()) {
        config.api_host = host.clone();
    }
    if let Some(port) = flags.api_port {
        config.api_port = port;
    }
    Ok(config)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or("help");

    match cmd {
        "serve" => serve::run_serve(parse_serve_flags(&args, 2)).await,
        "watch" => watch::run_watch(parse_watch_flags(&args, 2)).await,
        "snapshot" => inspect::run_snapshot(parse_serve_flags(&args, 2)).await,
        "invoke" => inspect::run_invoke(parse_invoke_args(&args, 2)?).await,
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            print_error(&format!("Unknown command: {}", other));
            print_help();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_serve_flags_reads_host_port_and_config() {
        let args = argv(&[
            "gatewatch",
            "serve",
            "--api-host",
            "0.0.0.0",
            "--api-port",
            "19000",
            "--config",
            "/etc/gatewatch.toml",
        ]);
        let flags = parse_serve_flags(&args, 2);
        assert_eq!(flags.api_host.as_deref(), Some("0.0.0.0"));
        assert_eq!(flags.api_port, Some(19000));
        assert_eq!(flags.config, Some(PathBuf::from("/etc/gatewatch.toml")));
    }

    #[test]
    fn parse_serve_flags_ignores_bad_port_and_dangling_flag() {
        let args = argv(&["gatewatch", "serve", "--api-port", "nope", "--api-host"]);
        let flags = parse_serve_flags(&args, 2);
        assert_eq!(flags.api_port, None);
        assert_eq!(flags.api_host, None);
    }

    #[test]
    fn parse_watch_flags_defaults_and_overrides() {
        let flags = parse_watch_flags(&argv(&["gatewatch", "watch"]), 2);
        assert_eq!(flags.api_url, "http://127.0.0.1:17900");
        assert_eq!(flags.interval, Duration::from_secs(4));
        assert!(flags.filter.is_empty());

        let args = argv(&[
            "gatewatch",
            "watch",
            "--api-url",
            "http://10.0.0.2:18000/",
            "--interval",
            "2.5",
            "--filter",
            "research",
        ]);
        let flags = parse_watch_flags(&args, 2);
        assert_eq!(flags.api_url, "http://10.0.0.2:18000");
        assert_eq!(flags.interval, Duration::from_millis(2500));
        assert_eq!(flags.filter, "research");
    }

    #[test]
    fn parse_watch_flags_rejects_non_positive_interval() {
        let args = argv(&["gatewatch", "watch", "--interval", "0"]);
        assert_eq!(parse_watch_flags(&args, 2).interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn parse_invoke_args_reads_tool_and_json() {
        let args = argv(&[
            "gatewatch",
            "invoke",
            "cron",
            r#"{"action":"list"}"#,
            "--config",
            "gw.toml",
        ]);
        let parsed = parse_invoke_args(&args, 2).unwrap();
        assert_eq!(parsed.tool, "cron");
        assert_eq!(parsed.args, json!({"action": "list"}));
        assert_eq!(parsed.config, Some(PathBuf::from("gw.toml")));

        let parsed = parse_invoke_args(&argv(&["gatewatch", "invoke", "usage"]), 2).unwrap();
        assert_eq!(parsed.args, json!({}));
    }

    #[test]
    fn parse_invoke_args_requires_tool_and_object_args() {
        assert!(parse_invoke_args(&argv(&["gatewatch", "invoke"]), 2).is_err());
        assert!(parse_invoke_args(&argv(&["gatewatch", "invoke", "x", "[1]"]), 2).is_err());
        assert!(parse_invoke_args(&argv(&["gatewatch", "invoke", "x", "{oops"]), 2).is_err());
    }
}
