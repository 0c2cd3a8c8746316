// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Global transaction identifiers and executed-set bookkeeping

use super::lib::{BinlogError, BinlogResult};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One transaction: source server and its sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Gtid {
    pub server: Uuid,
    pub sequence: i64,
}

impl Gtid {
    pub fn new(server: Uuid, sequence: i64) -> Self {
        Self { server, sequence }
    }
}

impl fmt::Display for Gtid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.server, self.sequence)
    }
}

impl FromStr for Gtid {
    type Err = BinlogError;

    fn from_str(s: &str) -> BinlogResult<Self> {
        let (sid, seq) = s.trim().split_once(':').ok_or_else(|| BinlogError::InvalidGtid(s.to_string()))?;
        let server = Uuid::parse_str(sid).map_err(|e| BinlogError::InvalidGtid(format!("{}: {}", s, e)))?;
        let sequence = seq.parse::<i64>().map_err(|e| BinlogError::InvalidGtid(format!("{}: {}", s, e)))?;
        Ok(Self { server, sequence })
    }
}

/// Closed interval of sequence numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interval {
    start: i64,
    end: i64,
}

/// Executed GTIDs as merged intervals per server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GtidSet {
    sets: BTreeMap<Uuid, Vec<Interval>>,
}

impl GtidSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn contains(&self, gtid: &Gtid) -> bool {
        self.sets.get(&gtid.server).is_some_and(|ivs| ivs.iter().any(|iv| iv.start <= gtid.sequence && gtid.sequence <= iv.end))
    }

    /// Add one transaction, merging it with adjacent intervals
    pub fn add_gtid(&mut self, gtid: Gtid) {
        self.add_interval(gtid.server, Interval { start: gtid.sequence, end: gtid.sequence });
    }

    fn add_interval(&mut self, server: Uuid, interval: Interval) {
        let intervals = self.sets.entry(server).or_default();
        intervals.push(interval);
        intervals.sort_by_key(|iv| iv.start);
        let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
        for iv in intervals.drain(..) {
            match merged.last_mut() {
                Some(last) if iv.start <= last.end.saturating_add(1) => last.end = last.end.max(iv.end),
                _ => merged.push(iv),
            }
        }
        *intervals = merged;
    }
}

impl fmt::Display for GtidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (server, intervals)) in self.sets.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", server)?;
            for iv in intervals {
                if iv.start == iv.end {
                    write!(f, ":{}", iv.start)?;
                } else {
                    write!(f, ":{}-{}", iv.start, iv.end)?;
                }
            }
        }
        Ok(())
    }
}

impl FromStr for GtidSet {
    type Err = BinlogError;

    fn from_str(s: &str) -> BinlogResult<Self> {
        let mut set = GtidSet::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let mut fields = part.split(':');
            let sid = fields.next().unwrap_or_default();
            let server = Uuid::parse_str(sid).map_err(|e| BinlogError::InvalidGtid(format!("{}: {}", part, e)))?;
            let mut any = false;
            for range in fields {
                let parse = |v: &str| v.parse::<i64>().map_err(|e| BinlogError::InvalidGtid(format!("{}: {}", part, e)));
                let interval = match range.split_once('-') {
                    Some((a, b)) => Interval { start: parse(a)?, end: parse(b)? },
                    None => {
                        let n = parse(range)?;
                        Interval { start: n, end: n }
                    }
                };
                if interval.start > interval.end {
                    return Err(BinlogError::InvalidGtid(part.to_string()));
                }
                set.add_interval(server, interval);
                any = true;
            }
            if !any {
                return Err(BinlogError::InvalidGtid(part.to_string()));
            }
        }
        Ok(set)
    }
}

/// Replication position: the set of executed transactions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Position {
    pub gtid_set: GtidSet,
}

impl Position {
    pub fn is_zero(&self) -> bool {
        self.gtid_set.is_empty()
    }

    /// Sequence number of the last transaction in a single-interval position
    ///
    /// Only `<uuid>:<n>` and `<uuid>:<a>-<n>` are accepted; anything else,
    /// including positions spanning several servers, is an error.
    pub fn last_sequence(&self) -> BinlogResult<Option<i64>> {
        let rendered = self.to_string();
        if rendered.is_empty() {
            return Ok(None);
        }
        if rendered.contains(',') {
            return Err(BinlogError::UnexpectedGtidFormat(rendered));
        }
        let components: Vec<&str> = rendered.split(':').collect();
        if components.len() != 2 {
            return Err(BinlogError::UnexpectedGtidFormat(rendered));
        }
        let sequence: Vec<&str> = components[1].split('-').collect();
        let last = match sequence.as_slice() {
            [n] | [_, n] => *n,
            _ => return Err(BinlogError::UnexpectedGtidFormat(rendered)),
        };
        last.parse::<i64>().map(Some).map_err(|e| BinlogError::InvalidGtid(format!("{}: {}", rendered, e)))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.gtid_set)
    }
}

impl FromStr for Position {
    type Err = BinlogError;

    fn from_str(s: &str) -> BinlogResult<Self> {
        Ok(Self { gtid_set: s.parse()? })
    }
}
