//! Tests for check and ctl.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use std::path::PathBuf;

#[test]
fn cli_parse_check() {
    match parse(&["mirrors", "check", "--config", "mirrors.toml"]) {
        CliCommand::Check { config } => assert_eq!(config, Some(PathBuf::from("mirrors.toml"))),
        _ => panic!("expected Check"),
    }
}

#[test]
fn cli_parse_ctl_joins_words() {
    match parse(&["mirrors", "ctl", "enqueue", "debian"]) {
        CliCommand::Ctl { socket, command } => {
            assert!(socket.is_none());
            assert_eq!(command.join(" "), "enqueue debian");
        }
        _ => panic!("expected Ctl"),
    }
}

#[test]
fn cli_parse_ctl_with_socket() {
    match parse(&["mirrors", "ctl", "--socket", "/tmp/c.sock", "status"]) {
        CliCommand::Ctl { socket, command } => {
            assert_eq!(socket, Some(PathBuf::from("/tmp/c.sock")));
            assert_eq!(command, vec!["status".to_string()]);
        }
        _ => panic!("expected Ctl"),
    }
}

#[test]
fn cli_ctl_requires_a_command() {
    assert!(Cli::try_parse_from(["mirrors", "ctl"]).is_err());
}
