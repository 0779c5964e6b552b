// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod error;
pub mod settings;
pub mod types;

pub use error::{FatalError, GpuResult};
pub use types::*;
