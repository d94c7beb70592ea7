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

//! Operator actions
//!
//! Each action is one request/reply exchange on an open connection and
//! yields the text to print.

use chrono::{DateTime, FixedOffset, Utc};
use clap::Subcommand;
use serde_json::{json, Value};
use tracing::debug;

use fand_core::Connection;
use fand_error::{FandError, Result};
use fand_protocol::{format_timestamp, parse_timestamp, RequestKind};

use crate::duration::parse_duration;
use crate::reply::{expect_ack, expect_shelf_value};

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Action {
    /// Send a raw request and print the reply
    Raw {
        /// Request name, e.g. get_pwm
        request: String,
        /// Arguments, parsed as JSON when possible
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Ping the server
    Ping,
    /// Print the PWM value of a shelf
    #[command(name = "shelfpwm")]
    ShelfPwm { shelf: String },
    /// Print the RPM value of a shelf
    #[command(name = "shelfrpm")]
    ShelfRpm { shelf: String },
    /// Override the PWM value of a shelf (percentage, or `none` to clear)
    #[command(name = "shelfpwm-override")]
    ShelfPwmOverride { shelf: String, value: String },
    /// Expire the PWM override on a date, e.g. 2020-12-29T01:01:59+01:00
    #[command(name = "shelfpwm-expire-on")]
    ShelfPwmExpireOn { shelf: String, date: String },
    /// Expire the PWM override after a duration, e.g. 21d4h1m5s or 1:04:22
    #[command(name = "shelfpwm-expire-in")]
    ShelfPwmExpireIn { shelf: String, duration: String },
}

/// `none` clears the override, anything else must be a number
pub fn parse_override(value: &str) -> Result<Option<f64>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .map_err(|_| FandError::invalid_value(format!("{value} is not a PWM value")))
}

fn raw_arg(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

fn expire_in(duration: &str, now: DateTime<Utc>) -> Result<DateTime<FixedOffset>> {
    let duration = parse_duration(duration)?;
    let delta = chrono::Duration::from_std(duration)
        .map_err(|_| FandError::invalid_value("Duration out of range"))?;
    let expire = now
        .checked_add_signed(delta)
        .ok_or_else(|| FandError::invalid_value("Duration out of range"))?;
    Ok(expire.into())
}

fn set_expire(conn: &Connection, shelf: &str, expire: DateTime<FixedOffset>) -> Result<String> {
    debug!("Sending SET_PWM_EXPIRE {} for {} to {}", expire, shelf, conn);
    conn.send(
        RequestKind::SetPwmExpire,
        &[json!(shelf), json!(format_timestamp(&expire))],
    )?;
    expect_ack(&conn.recv()?)?;
    Ok("ok".to_string())
}

/// Run one action and return what to print
pub fn execute(conn: &Connection, action: &Action) -> Result<String> {
    debug!("Running {:?} on {}", action, conn);
    match action {
        Action::Raw { request, args } => {
            let kind = request.parse::<RequestKind>()?;
            let args: Vec<Value> = args.iter().map(|a| raw_arg(a)).collect();
            conn.send(kind, &args)?;
            Ok(conn.recv()?.to_string())
        }
        Action::Ping => {
            conn.send(RequestKind::Ping, &[])?;
            expect_ack(&conn.recv()?)?;
            Ok("ok".to_string())
        }
        Action::ShelfPwm { shelf } => {
            conn.send(RequestKind::GetPwm, &[json!(shelf)])?;
            let pwm = expect_shelf_value(&conn.recv()?, RequestKind::SetPwm, shelf)?;
            Ok(pwm.to_string())
        }
        Action::ShelfRpm { shelf } => {
            conn.send(RequestKind::GetRpm, &[json!(shelf)])?;
            let rpm = expect_shelf_value(&conn.recv()?, RequestKind::SetRpm, shelf)?;
            Ok(rpm.to_string())
        }
        Action::ShelfPwmOverride { shelf, value } => {
            let value = parse_override(value)?;
            conn.send(RequestKind::SetPwmOverride, &[json!(shelf), json!(value)])?;
            expect_ack(&conn.recv()?)?;
            Ok("ok".to_string())
        }
        Action::ShelfPwmExpireOn { shelf, date } => set_expire(conn, shelf, parse_timestamp(date)?),
        Action::ShelfPwmExpireIn { shelf, duration } => {
            set_expire(conn, shelf, expire_in(duration, Utc::now())?)
        }
    }
}
