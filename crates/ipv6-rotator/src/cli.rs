//! Command-line interface

use clap::{Args, Parser, Subcommand};
use ipv6_rotator_core::RangeSelection;
use ipv6_rotator_core::ranges::{DEFAULT_SERVICE, known_service, service_names};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "smart-ipv6-rotator",
    version,
    about = "IPv6 rotator for specific subnets - unblock restrictions on IPv6 enabled websites"
)]
pub struct Cli {
    /// Log level: trace, debug, info, warn or error.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Where rotation records are kept.
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the IPv6 rotator process.
    Run(RunArgs),

    /// Clean your system for a given service / IPv6 ranges.
    #[command(visible_alias = "clean-one")]
    Clean(CleanArgs),

    /// Clean all configurations made by this tool.
    CleanAll(PrivilegeArgs),
}

#[derive(Debug, Args)]
pub struct PrivilegeArgs {
    /// Skip the root check (e.g. when CAP_NET_ADMIN is already held).
    #[arg(long)]
    pub skip_root: bool,
}

#[derive(Debug, Args)]
pub struct SelectionArgs {
    /// Comma-separated services to rotate for.
    #[arg(long, default_value = DEFAULT_SERVICE, value_parser = parse_services)]
    pub services: String,

    /// Comma-separated extra IPv6 ranges, e.g. 2407:7000:9827:4100::/64.
    #[arg(long, visible_alias = "ipv6-ranges")]
    pub external_ipv6_ranges: Option<String>,

    /// Ignore --services and only use --external-ipv6-ranges.
    #[arg(long)]
    pub no_services: bool,
}

/// Accept a comma-separated list of known service names
fn parse_services(value: &str) -> Result<String, String> {
    let unknown = value
        .split(',')
        .map(str::trim)
        .find(|name| !name.is_empty() && known_service(name).is_none());

    match unknown {
        Some(name) => Err(format!(
            "unknown service '{}' (known: {})",
            name,
            service_names().collect::<Vec<_>>().join(", ")
        )),
        None => Ok(value.to_string()),
    }
}

impl SelectionArgs {
    pub fn selection(&self) -> RangeSelection {
        let selection = RangeSelection::services(self.services.clone())
            .with_no_services(self.no_services);
        match &self.external_ipv6_ranges {
            Some(ranges) => selection.with_manual_ranges(ranges.clone()),
            None => selection,
        }
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Your IPv6 range. Example: 2407:7000:9827:4100::/64
    #[arg(long = "ipv6range", visible_alias = "ipv6-range")]
    pub ipv6range: String,

    #[command(flatten)]
    pub selection: SelectionArgs,

    #[command(flatten)]
    pub privilege: PrivilegeArgs,

    /// Do not check that the new address is used (unattended runs).
    #[arg(long)]
    pub cron: bool,

    /// Network interface to use instead of the one the default route points at.
    #[arg(long)]
    pub interface: Option<String>,

    /// IPv6 gateway to use instead of the default route's.
    #[arg(long)]
    pub gateway: Option<String>,
}

#[derive(Debug, Args)]
pub struct CleanArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    #[command(flatten)]
    pub privilege: PrivilegeArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_defaults() {
        let cli = parse(&["smart-ipv6-rotator", "run", "--ipv6range", "2001:db8::/64"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };

        assert_eq!(args.ipv6range, "2001:db8::/64");
        assert_eq!(args.selection.services, "google");
        assert!(!args.selection.no_services);
        assert!(!args.cron);
        assert!(!args.privilege.skip_root);
        assert_eq!(args.interface, None);
    }

    #[test]
    fn test_run_aliases() {
        let cli = parse(&[
            "smart-ipv6-rotator",
            "run",
            "--ipv6-range",
            "2001:db8::/64",
            "--ipv6-ranges",
            "2001:db8:1::/48",
            "--no-services",
            "--cron",
            "--skip-root",
            "--interface",
            "eth1",
            "--gateway",
            "fe80::1",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };

        assert_eq!(args.selection.external_ipv6_ranges.as_deref(), Some("2001:db8:1::/48"));
        assert!(args.selection.no_services);
        assert!(args.cron);
        assert!(args.privilege.skip_root);
        assert_eq!(args.interface.as_deref(), Some("eth1"));
        assert_eq!(args.gateway.as_deref(), Some("fe80::1"));

        let ranges = args.selection.selection().resolve().unwrap();
        assert_eq!(ranges.len(), 1);
    }

    #[test]
    fn test_run_requires_range() {
        assert!(Cli::try_parse_from(["smart-ipv6-rotator", "run"]).is_err());
    }

    #[test]
    fn test_clean_one_alias() {
        let cli = parse(&["smart-ipv6-rotator", "clean-one", "--services", "google"]);
        assert!(matches!(cli.command, Command::Clean(_)));
    }

    #[test]
    fn test_clean_all_and_globals() {
        let cli = parse(&[
            "smart-ipv6-rotator",
            "clean-all",
            "--skip-root",
            "--log-level",
            "debug",
            "--state-file",
            "/run/rotator.json",
        ]);

        assert!(matches!(cli.command, Command::CleanAll(PrivilegeArgs { skip_root: true })));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.state_file, Some(PathBuf::from("/run/rotator.json")));
    }

    #[test]
    fn test_unknown_service_is_a_parse_error() {
        let err = Cli::try_parse_from(["smart-ipv6-rotator", "clean", "--services", "google,nope"])
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unknown service 'nope'"), "{message}");
        assert!(message.contains("known: google"), "{message}");
    }

    #[test]
    fn test_selection_passes_services_through() {
        let cli = parse(&["smart-ipv6-rotator", "clean", "--services", "google,google"]);
        let Command::Clean(args) = cli.command else {
            panic!("expected clean");
        };
        let ranges = args.selection.selection().resolve().unwrap();
        assert_eq!(ranges.len(), 6);
    }
}
