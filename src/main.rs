use anyhow::Context;
use clap::{CommandFactory, Parser};
use config::RunConfig;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};

mod cleanup;
mod config;
mod error;
mod io;
mod merge;

#[derive(Parser, Debug)]
#[command(
    name = "clash-yaml-merge",
    about = "Merge a clash template into a clash configuration",
    long_about = "Merge a clash template into a clash configuration.\n\n\
        When file names are piped in on stdin, the last one is used as the source \
        configuration and --input is ignored."
)]
struct Args {
    /// Source clash config YAML
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Target clash config YAML
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Template clash config YAML
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Cleanup patterns YAML (remove / replace lists)
    #[arg(short, long)]
    patterns: Option<PathBuf>,

    /// Match cleanup patterns case-sensitively unless they end with /i
    #[arg(long)]
    case_sensitive: bool,

    #[arg(short, long)]
    verbose: bool,
}

/// Directory of the executable, where the default files live.
fn app_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolves paths from flags, defaults and any file names piped in on stdin.
fn run_config(args: &Args, base_dir: &Path, stdin_files: Option<&[PathBuf]>) -> RunConfig {
    let mut config = RunConfig::with_defaults(base_dir);

    if let Some(template) = &args.template {
        config.template = template.clone();
    }
    if let Some(output) = &args.output {
        config.target = output.clone();
    }
    if let Some(patterns) = &args.patterns {
        config.patterns = patterns.clone();
    }
    config.ignore_case = !args.case_sensitive;

    match stdin_files {
        Some(files) => {
            if args.input.is_some() {
                warn!("Reading file names from stdin, ignoring --input");
            }
            if let Some(last) = files.last() {
                config.source = last.clone();
            }
        }
        None => {
            if let Some(input) = &args.input {
                config.source = input.clone();
            }
        }
    }

    config
}

/// Load, merge, clean up and save. Returns whether a target was written.
async fn run(config: &RunConfig) -> bool {
    let template = io::load_document(&config.template).await;
    let source = io::load_document(&config.source).await;

    let (Some(template), Some(mut target)) = (template, source) else {
        warn!("Template and source are both required, nothing merged");
        return false;
    };

    merge::merge_into(template, &mut target);

    let patterns = io::load_patterns(&config.patterns).await;
    if !patterns.is_empty() {
        cleanup::clean_up(&mut target, &patterns, config.ignore_case);
    }

    for (group, member) in target.dangling_members() {
        warn!("Group {} references unknown member {}", group, member);
    }
    for rule in target.unroutable_rules() {
        warn!("Rule {} targets an unknown group", rule);
    }

    io::save_document(&target, &config.target).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let interactive = std::io::stdin().is_terminal();

    if interactive && std::env::args_os().len() <= 1 {
        Args::command().print_help()?;
        return Ok(());
    }

    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .init();

    let stdin_files = if interactive {
        None
    } else {
        let files = io::read_file_list(tokio::io::stdin())
            .await
            .context("Failed to read file names from stdin")?;
        for file in &files {
            info!("FileName = {}", file.display());
        }
        Some(files)
    };

    let config = run_config(&args, &app_dir(), stdin_files.as_deref());

    info!("Source: {}", config.source.display());
    info!("Target: {}", config.target.display());
    info!("Template: {}", config.template.display());

    if run(&config).await {
        info!("Program exit");
    } else {
        warn!("No target written");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, clash::ClashConfig};
    use temp_dir::TempDir;

    const TEMPLATE: &str = r#"
mixed-port: 7890
mode: rule
proxies:
  - { name: A, type: ss, server: a.example.com, port: 443 }
proxy-groups:
  - { name: Proxy, type: select, proxies: [A, DIRECT] }
  - { name: Auto, type: url-test, proxies: [A] }
rules:
  - DOMAIN-SUFFIX,google.com,Proxy
  - GEOIP,CN,DIRECT
"#;

    const SOURCE: &str = r#"
mixed-port: 7891
proxies:
  - { name: 香港 01, type: vmess, server: hk.example.com, port: 443 }
  - { name: 剩余流量：10GB, type: ss, server: 127.0.0.1, port: 1 }
proxy-groups:
  - { name: Select, type: select, proxies: [香港 01, 剩余流量：10GB] }
rules:
  - DOMAIN,example.com,Select
"#;

    fn args(list: &[&str]) -> Args {
        Args::parse_from(std::iter::once("clash-yaml-merge").chain(list.iter().copied()))
    }

    #[test]
    fn test_run_config_flags() {
        let args = args(&["-i", "in.yaml", "-o", "out.yaml", "--case-sensitive"]);
        let config = run_config(&args, Path::new("/app"), None);

        assert_eq!(config.source, Path::new("in.yaml"));
        assert_eq!(config.target, Path::new("out.yaml"));
        assert_eq!(config.template, Path::new("/app/default.yaml"));
        assert!(!config.ignore_case);
    }

    #[test]
    fn test_run_config_stdin_overrides_input() {
        let args = args(&["-i", "in.yaml"]);
        let files = vec![PathBuf::from("first.yaml"), PathBuf::from("last.yaml")];

        let config = run_config(&args, Path::new("/app"), Some(files.as_slice()));
        assert_eq!(config.source, Path::new("last.yaml"));

        let config = run_config(&args, Path::new("/app"), Some([].as_slice()));
        assert_eq!(config.source, Path::new("/app/source.yaml"));
    }

    #[tokio::test]
    async fn test_run_pipeline() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.child("default.yaml"), TEMPLATE).unwrap();
        std::fs::write(dir.child("source.yaml"), SOURCE).unwrap();
        std::fs::write(
            dir.child(config::PATTERNS_FILE),
            "remove:\n  - 剩余流量\nreplace:\n  香港: HK\n",
        )
        .unwrap();

        let config = RunConfig::with_defaults(dir.path());
        assert!(run(&config).await);

        let text = std::fs::read_to_string(dir.child("target.yaml")).unwrap();
        let target: ClashConfig = serde_yaml::from_str(&text).unwrap();

        assert_eq!(
            target.settings.get("mixed-port").and_then(|v| v.as_u64()),
            Some(7891)
        );
        assert_eq!(target.settings.get("mode").and_then(|v| v.as_str()), None);
        assert_eq!(target.proxy_names(), vec!["HK 01", "A"]);
        assert_eq!(target.group_names(), vec!["Auto", "Proxy", "Select"]);
        assert_eq!(
            target.find_group("Select").unwrap().members(),
            &["Auto", "Proxy", "A", "HK 01"]
        );
        assert_eq!(
            target.rule_list(),
            &["DOMAIN-SUFFIX, google.com, Proxy", "DOMAIN, example.com, Select"]
        );
        assert!(target.dangling_members().is_empty());
        // template rules pointing at DIRECT are not carried over
        assert!(target.unroutable_rules().is_empty());
    }

    #[tokio::test]
    async fn test_run_without_template() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.child("source.yaml"), SOURCE).unwrap();

        let config = RunConfig::with_defaults(dir.path());
        assert!(!run(&config).await);
        assert!(!dir.child("target.yaml").exists());
    }
}
