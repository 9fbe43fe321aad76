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

use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::{InvalidConfigurationSnafu, Result};

/// A replay job configuration. `stuck` uses sentinel semantics: positive is
/// a one-shot pause directive, negative means "leave unchanged" when merging
/// a partial update, zero clears any pending pause.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfiguration {
    pub rate: f32,
    pub speed: f32,
    pub begin_ms: i64,
    pub end_ms: i64,
    pub stuck_ms: i64,
}

impl Default for JobConfiguration {
    fn default() -> Self {
        JobConfiguration {
            rate: 1.0,
            speed: 1.0,
            begin_ms: 0,
            end_ms: 0,
            stuck_ms: -1,
        }
    }
}

impl JobConfiguration {
    /// Validates the fields required to start a job: `begin`/`end` set,
    /// `rate`/`speed` strictly positive, `stuck` not less than the
    /// "unchanged" sentinel.
    pub fn check(&self) -> Result<()> {
        ensure!(
            self.begin_ms != 0,
            InvalidConfigurationSnafu {
                msg: "begin must be set".to_string(),
            }
        );
        ensure!(
            self.end_ms != 0,
            InvalidConfigurationSnafu {
                msg: "end must be set".to_string(),
            }
        );
        ensure!(
            self.end_ms > self.begin_ms,
            InvalidConfigurationSnafu {
                msg: "end must be after begin".to_string(),
            }
        );
        ensure!(
            self.rate > 0.0,
            InvalidConfigurationSnafu {
                msg: "rate must be positive".to_string(),
            }
        );
        ensure!(
            self.speed > 0.0,
            InvalidConfigurationSnafu {
                msg: "speed must be positive".to_string(),
            }
        );
        ensure!(
            self.stuck_ms >= -1,
            InvalidConfigurationSnafu {
                msg: "stuck must be >= -1".to_string(),
            }
        );
        Ok(())
    }

    /// Merges a partial update `other` onto `self`, field by field. A field
    /// is only overwritten when `other` carries a meaningful value for it;
    /// `stuck` uses the `>= 0` merge-gate (negative means unchanged).
    pub fn merge(&self, other: &JobConfiguration) -> JobConfiguration {
        let mut merged = *self;
        if other.rate > 0.0 {
            merged.rate = other.rate;
        }
        if other.speed > 0.0 {
            merged.speed = other.speed;
        }
        if other.begin_ms > 0 {
            merged.begin_ms = other.begin_ms;
        }
        if other.end_ms > 0 {
            merged.end_ms = other.end_ms;
        }
        if other.stuck_ms >= 0 {
            merged.stuck_ms = other.stuck_ms;
        }
        merged
    }
}

/// One traffic-shaping overlay: every `interval_secs`, with probability
/// `probability`, take the feature's effect.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub peak: f32,
    pub interval_secs: i32,
    pub coverage_secs: i32,
    pub probability: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            peak: 0.0,
            interval_secs: 1,
            coverage_secs: 0,
            probability: 0.0,
        }
    }
}

impl FeatureConfig {
    pub fn merge(&self, other: &FeatureConfig) -> FeatureConfig {
        let mut merged = *self;
        if other.peak > 0.0 {
            merged.peak = other.peak;
        }
        if other.interval_secs > 0 {
            merged.interval_secs = other.interval_secs;
        }
        if other.coverage_secs > 0 {
            merged.coverage_secs = other.coverage_secs;
        }
        if other.probability > 0.0 {
            merged.probability = other.probability;
        }
        merged
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Feature {
    pub shake: FeatureConfig,
    pub strike: FeatureConfig,
}

impl Feature {
    pub fn merge(&self, other: &Feature) -> Feature {
        Feature {
            shake: self.shake.merge(&other.shake),
            strike: self.strike.merge(&other.strike),
        }
    }
}

impl From<JobConfiguration> for havok_proto::JobConfiguration {
    fn from(c: JobConfiguration) -> Self {
        havok_proto::JobConfiguration {
            rate: c.rate,
            speed: c.speed,
            begin_ms: c.begin_ms,
            end_ms: c.end_ms,
            stuck_ms: c.stuck_ms,
        }
    }
}

impl From<havok_proto::JobConfiguration> for JobConfiguration {
    fn from(c: havok_proto::JobConfiguration) -> Self {
        JobConfiguration {
            rate: c.rate,
            speed: c.speed,
            begin_ms: c.begin_ms,
            end_ms: c.end_ms,
            stuck_ms: c.stuck_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_only_overwrites_positive_fields() {
        let base = JobConfiguration {
            rate: 1.0,
            speed: 1.0,
            begin_ms: 100,
            end_ms: 200,
            stuck_ms: -1,
        };
        let patch = JobConfiguration {
            rate: 0.0,
            speed: 2.0,
            begin_ms: 0,
            end_ms: 0,
            stuck_ms: -1,
        };
        let merged = base.merge(&patch);
        assert_eq!(merged.rate, 1.0);
        assert_eq!(merged.speed, 2.0);
        assert_eq!(merged.begin_ms, 100);
        assert_eq!(merged.stuck_ms, -1);
    }

    #[test]
    fn stuck_merge_gate_is_non_negative() {
        let base = JobConfiguration {
            stuck_ms: -1,
            ..Default::default()
        };
        let clears = base.merge(&JobConfiguration {
            stuck_ms: 0,
            ..Default::default()
        });
        assert_eq!(clears.stuck_ms, 0);

        let unchanged = clears.merge(&JobConfiguration {
            stuck_ms: -1,
            ..Default::default()
        });
        assert_eq!(unchanged.stuck_ms, 0);
    }

    #[test]
    fn check_rejects_bad_windows() {
        let cfg = JobConfiguration {
            begin_ms: 0,
            ..Default::default()
        };
        assert!(cfg.check().is_err());
    }
}
