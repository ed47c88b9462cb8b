// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use netconf_peer_rs::cfg::logger::init_logger;
use serial_test::serial;

#[test]
#[serial]
fn logger_initializes_from_yaml() -> Result<()> {
    let _guard = init_logger("tests/config_logger.yaml")?;
    tracing::info!("logger smoke test");
    Ok(())
}

#[test]
#[serial]
fn missing_logger_config_is_an_error() {
    assert!(init_logger("tests/no_such_logger.yaml").is_err());
}
