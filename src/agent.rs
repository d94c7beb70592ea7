/*
 * This file is part of fand.
 *
 * Copyright (C) 2025 fand contributors
 *
 * fand is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * fand is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with fand. If not, see <https://www.gnu.org/licenses/>.
 */

//! Per-shelf agent loop
//!
//! Every round: ask the server for the shelf PWM, apply it, let the fan
//! settle, then report the measured RPM. A broken exchange drops the
//! connection and opens a new one; failing to reach the server or to drive
//! the fan stops the agent.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, error, info};

use fand_core::constants::agent::{PWM_SETTLE, REPORT_INTERVAL};
use fand_core::{Connection, ConnectionRegistry, Registered, Terminator};
use fand_error::{ErrorKind, FandError, Result};
use fand_protocol::RequestKind;

use crate::hwmon::{PwmActuator, RpmSensor};
use crate::reply::{expect_ack, expect_shelf_value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub shelf: String,
    pub address: String,
    pub port: u16,
    /// Wait between applying the PWM and reading the tachometer
    pub settle: Duration,
    /// Wait between two rounds
    pub interval: Duration,
}

impl AgentSettings {
    pub fn new(shelf: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            shelf: shelf.into(),
            address: address.into(),
            port,
            settle: PWM_SETTLE,
            interval: REPORT_INTERVAL,
        }
    }
}

pub struct Agent<P, R> {
    settings: AgentSettings,
    pwm: P,
    rpm: R,
    connections: Arc<ConnectionRegistry>,
}

impl<P: PwmActuator, R: RpmSensor> Agent<P, R> {
    pub fn new(settings: AgentSettings, pwm: P, rpm: R, connections: Arc<ConnectionRegistry>) -> Self {
        Self {
            settings,
            pwm,
            rpm,
            connections,
        }
    }

    fn terminator(&self) -> &Terminator {
        self.connections.terminator()
    }

    fn connect(&self) -> Result<Connection> {
        let (address, port) = (&self.settings.address, self.settings.port);
        match self.connections.connect(address, port) {
            Ok(conn) => {
                info!("Connected to {}:{}", address, port);
                Ok(conn)
            }
            Err(FandError::Terminating) => Err(FandError::Terminating),
            Err(e) => {
                error!("Failed to connect to {}:{}: {}", address, port, e);
                self.terminator().terminate(Some("Cannot connect to server".to_string()));
                Err(e)
            }
        }
    }

    /// One GET_PWM / SET_RPM round, returning the applied PWM and measured RPM
    fn exchange(&mut self, conn: &Connection) -> Result<(f64, f64)> {
        let shelf = self.settings.shelf.clone();

        debug!("Updating PWM");
        conn.send(RequestKind::GetPwm, &[json!(shelf)])?;
        let pwm = expect_shelf_value(&conn.recv()?, RequestKind::SetPwm, &shelf)?;
        info!("Setting PWM for {} to {}", shelf, pwm);
        self.pwm.apply(pwm)?;

        if !self.terminator().sleep(self.settings.settle) {
            return Err(FandError::Terminating);
        }

        debug!("Updating RPM");
        let rpm = self.rpm.read_rpm()?;
        conn.send(RequestKind::SetRpm, &[json!(shelf), json!(rpm)])?;
        expect_ack(&conn.recv()?)?;
        Ok((pwm, rpm))
    }

    /// Run until terminated
    ///
    /// Returns an error when the server cannot be reached or the fan cannot
    /// be driven; the terminator then carries the reason.
    pub fn run(&mut self) -> Result<()> {
        info!("Starting agent for shelf {}", self.settings.shelf);
        let mut conn = match self.connect() {
            Ok(conn) => conn,
            Err(FandError::Terminating) => return Ok(()),
            Err(e) => return Err(e),
        };

        while !self.terminator().is_terminating() {
            match self.exchange(&conn) {
                Ok((pwm, rpm)) => info!("Updated: PWM = {}, RPM = {}", pwm, rpm),
                Err(_) if self.terminator().is_terminating() => break,
                Err(e) if e.kind() == ErrorKind::Hardware => {
                    self.terminator()
                        .terminate(Some(format!("Cannot continue after fan failure: {e}")));
                    return Err(e);
                }
                Err(e) => {
                    error!("Exchange with {} failed: {}", conn, e);
                    conn.close(None, true);
                    conn = match self.connect() {
                        Ok(conn) => conn,
                        Err(FandError::Terminating) => break,
                        Err(e) => return Err(e),
                    };
                }
            }
            self.terminator().sleep(self.settings.interval);
        }

        debug!("Agent for shelf {} stopped", self.settings.shelf);
        Ok(())
    }
}
