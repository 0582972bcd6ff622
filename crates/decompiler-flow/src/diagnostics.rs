// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Diagnostic sink threaded through the builder and reducer.
//!
//! Diagnostics are collected per structuring run so callers (and tests) can
//! inspect exactly what was emitted for one function. Each entry is mirrored
//! to the `log` facade at the matching level.

use crate::instruction::Address;
use log::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One collected diagnostic, optionally anchored to an address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub address: Option<Address>,
}

/// Accumulates diagnostics for a single function's structuring run.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    entries: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Severity::Info, message.into(), None);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message.into(), None);
    }

    pub fn warning_at(&mut self, address: Address, message: impl Into<String>) {
        self.push(Severity::Warning, message.into(), Some(address));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, message.into(), None);
    }

    fn push(&mut self, severity: Severity, message: String, address: Option<Address>) {
        match severity {
            Severity::Info => info!("{}", message),
            Severity::Warning => warn!("{}", message),
            Severity::Error => error!("{}", message),
        }
        self.entries.push(Diagnostic {
            severity,
            message,
            address,
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }
}
