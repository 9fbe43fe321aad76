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

//! A human-readable duration newtype for configuration structs, the way
//! `"10s"` / `"200ms"` appear throughout dispatcher and replayer TOML files.

use std::{
    fmt,
    str::FromStr,
    time::Duration,
};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub struct ReadableDuration(pub Duration);

impl ReadableDuration {
    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn secs(secs: u64) -> Self {
        ReadableDuration(Duration::from_secs(secs))
    }

    pub fn millis(ms: u64) -> Self {
        ReadableDuration(Duration::from_millis(ms))
    }
}

impl From<Duration> for ReadableDuration {
    fn from(d: Duration) -> Self {
        ReadableDuration(d)
    }
}

impl From<ReadableDuration> for Duration {
    fn from(d: ReadableDuration) -> Self {
        d.0
    }
}

impl fmt::Display for ReadableDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0.as_millis();
        if ms % 1000 == 0 {
            write!(f, "{}s", ms / 1000)
        } else {
            write!(f, "{}ms", ms)
        }
    }
}

#[derive(Debug)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid duration literal: {}", self.0)
    }
}

impl std::error::Error for ParseError {}

impl FromStr for ReadableDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (num, unit) = s
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .map(|idx| s.split_at(idx))
            .ok_or_else(|| ParseError(s.to_owned()))?;
        let value: f64 = num.parse().map_err(|_| ParseError(s.to_owned()))?;
        let millis = match unit {
            "ms" => value,
            "s" => value * 1000.0,
            "m" => value * 60_000.0,
            "h" => value * 3_600_000.0,
            _ => return Err(ParseError(s.to_owned())),
        };
        Ok(ReadableDuration(Duration::from_millis(millis as u64)))
    }
}

impl Serialize for ReadableDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ReadableDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ReadableDuration::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units() {
        let cases = vec![
            ("10s", Duration::from_secs(10)),
            ("200ms", Duration::from_millis(200)),
            ("1m", Duration::from_secs(60)),
            ("1.5s", Duration::from_millis(1500)),
        ];
        for (input, expected) in cases {
            assert_eq!(ReadableDuration::from_str(input).unwrap().0, expected);
        }
    }

    #[test]
    fn displays_round_trip() {
        let d = ReadableDuration::secs(5);
        assert_eq!(d.to_string(), "5s");
        assert_eq!(ReadableDuration::from_str(&d.to_string()).unwrap(), d);
    }

    #[test]
    fn rejects_garbage() {
        assert!(ReadableDuration::from_str("banana").is_err());
    }
}
