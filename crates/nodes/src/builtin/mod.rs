// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in node implementations shipped with every runner.

mod echo;
mod http_node;
mod sleep;
mod transform;

pub use echo::{EchoNode, NoopNode};
pub use http_node::HttpNode;
pub use sleep::SleepNode;
pub use transform::TransformJsonNode;
