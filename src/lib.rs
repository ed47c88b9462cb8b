// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod cfg;
pub mod errors;
pub mod framing;
pub mod msg;
pub mod poll;
pub mod server;
pub mod session;
pub mod transport;
