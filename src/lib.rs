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

//! fand clients
//!
//! The operator tool (`fanctl`) and the per-shelf agent (`fand-agent`) that
//! talk to the fand server. Shared pieces live in `fand-core`.

pub mod agent;
pub mod duration;
pub mod fanctl;
pub mod hwmon;
pub mod reply;

pub use agent::{Agent, AgentSettings};
pub use duration::parse_duration;
pub use fanctl::{execute, Action};
pub use hwmon::{HwmonPwm, HwmonTach, PwmActuator, RpmSensor};
