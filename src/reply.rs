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

//! Checks on server replies

use fand_error::{FandError, Result};
use fand_protocol::{Message, RequestKind};

pub fn expect_ack(reply: &Message) -> Result<()> {
    if reply.kind != RequestKind::Ack {
        return Err(FandError::unexpected_reply(RequestKind::Ack, reply));
    }
    Ok(())
}

/// Value of a `SET_PWM`/`SET_RPM` reply, which must name `shelf`
pub fn expect_shelf_value(reply: &Message, expected: RequestKind, shelf: &str) -> Result<f64> {
    if reply.kind != expected {
        return Err(FandError::unexpected_reply(expected, reply));
    }
    match reply.args.as_slice() {
        [name, value] if name.as_str() == Some(shelf) => value
            .as_f64()
            .ok_or_else(|| FandError::unexpected_reply(format!("{expected} with a number"), reply)),
        _ => Err(FandError::unexpected_reply(format!("{expected} for shelf {shelf}"), reply)),
    }
}
