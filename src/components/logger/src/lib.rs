// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Structured logging shared by the dispatcher and replayer binaries.
//!
//! Built on `slog`: one process-wide [`slog::Logger`] behind a
//! [`RuntimeLevel`] handle so the HTTP control surface can adjust verbosity
//! without a restart.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Once,
};

use serde::{Deserialize, Serialize};
use slog::{Drain, Level, Logger};

static INIT: Once = Once::new();
static mut GLOBAL_LOGGER: Option<Logger> = None;

/// Log level, mirrored onto [`slog::Level`] and serializable from config.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl From<LogLevel> for Level {
    fn from(l: LogLevel) -> Level {
        match l {
            LogLevel::Critical => Level::Critical,
            LogLevel::Error => Level::Error,
            LogLevel::Warning => Level::Warning,
            LogLevel::Info => Level::Info,
            LogLevel::Debug => Level::Debug,
            LogLevel::Trace => Level::Trace,
        }
    }
}

/// A live handle onto the active log level, shared with the drain so it can
/// be changed at runtime (e.g. from an HTTP control endpoint).
#[derive(Clone)]
pub struct RuntimeLevel {
    level: Arc<AtomicUsize>,
}

impl RuntimeLevel {
    fn new(initial: LogLevel) -> Self {
        RuntimeLevel {
            level: Arc::new(AtomicUsize::new(Level::from(initial).as_usize())),
        }
    }

    pub fn set(&self, level: LogLevel) {
        self.level
            .store(Level::from(level).as_usize(), Ordering::Relaxed);
    }

    pub fn get(&self) -> Level {
        Level::from_usize(self.level.load(Ordering::Relaxed)).unwrap_or(Level::Info)
    }
}

struct RuntimeLevelFilter<D> {
    drain: D,
    level: RuntimeLevel,
}

impl<D> Drain for RuntimeLevelFilter<D>
where
    D: Drain<Ok = (), Err = slog::Never>,
{
    type Ok = ();
    type Err = slog::Never;

    fn log(
        &self,
        record: &slog::Record,
        values: &slog::OwnedKVList,
    ) -> Result<Self::Ok, Self::Err> {
        if record.level().is_at_least(self.level.get()) {
            self.drain.log(record, values)
        } else {
            Ok(())
        }
    }
}

/// Configuration for [`init_log`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: LogLevel,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: LogLevel::Info,
        }
    }
}

/// Initializes the process-wide logger. Safe to call more than once; only the
/// first call takes effect. Returns a [`RuntimeLevel`] handle to adjust the
/// active level afterwards.
pub fn init_log(config: &LoggerConfig) -> RuntimeLevel {
    let level = RuntimeLevel::new(config.level);
    let handle = level.clone();

    INIT.call_once(|| {
        let decorator = slog_term::TermDecorator::new().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        let drain = RuntimeLevelFilter { drain, level }.fuse();
        let logger = Logger::root(drain, slog::o!());
        unsafe {
            GLOBAL_LOGGER = Some(logger);
        }
    });

    handle
}

/// Returns the process-wide logger, initializing a default one if
/// [`init_log`] was never called (useful for tests).
pub fn logger() -> Logger {
    unsafe {
        if GLOBAL_LOGGER.is_none() {
            init_log(&LoggerConfig::default());
        }
        GLOBAL_LOGGER.clone().expect("logger initialized above")
    }
}

#[macro_export]
macro_rules! info {
    ($($args:tt)+) => {
        slog::info!($crate::logger(), $($args)+)
    };
}

#[macro_export]
macro_rules! warn {
    ($($args:tt)+) => {
        slog::warn!($crate::logger(), $($args)+)
    };
}

#[macro_export]
macro_rules! error {
    ($($args:tt)+) => {
        slog::error!($crate::logger(), $($args)+)
    };
}

#[macro_export]
macro_rules! debug {
    ($($args:tt)+) => {
        slog::debug!($crate::logger(), $($args)+)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_level_round_trips() {
        let handle = RuntimeLevel::new(LogLevel::Info);
        assert_eq!(handle.get(), Level::Info);
        handle.set(LogLevel::Debug);
        assert_eq!(handle.get(), Level::Debug);
    }
}
