/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod config;
pub mod error;
pub mod opcode;
pub mod pin_cache_builder;
pub mod projection;
pub mod scheduler;
pub mod storage;
pub mod transaction;
