// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Netlink attribute framing and the two payload shapes exchanged with the
//! kernel module.
//!
//! Attribute values are standard `NLA` TLVs: a 2-byte length (including the
//! 4-byte header itself), a 2-byte type, the value, padded to a 4-byte
//! boundary. This mirrors the attribute walk
//! `other_examples/.../nlink-src-netlink-connector.rs.rs` does for its own
//! `NETLINK_CONNECTOR` payloads.

use thiserror::Error;
use winnow::binary::{le_u16, le_u32};
use winnow::token::take;
use winnow::Parser;

/// Commands understood by the family memlab sends requests on.
pub mod send_command {
    pub const MONITOR_PROCESS: u8 = 0;
    pub const HANDLED_CAUGHT_SIGNAL: u8 = 1;
}

/// Commands understood by the family memlab receives notifications on.
pub mod recv_command {
    pub const NOTIFY_CAUGHT_SIGNAL: u8 = 0;
}

pub const ATTRIBUTE_PID: u16 = 1;
pub const ATTRIBUTE_DO_WATCH: u16 = 2;
pub const ATTRIBUTE_SIGNAL_NOTIFICATION_SIGNAL: u16 = 3;

pub const ACTION_UNWATCH_PROCESS: u8 = 0;
pub const ACTION_WATCH_PROCESS: u8 = 1;

const NLA_HDR_LEN: usize = 4;
const NLA_ALIGN: usize = 4;

fn padded_len(len: usize) -> usize {
    (len + NLA_ALIGN - 1) & !(NLA_ALIGN - 1)
}

fn push_attr_u32(buf: &mut Vec<u8>, attr_type: u16, value: u32) {
    let total_len = (NLA_HDR_LEN + 4) as u16;
    buf.extend_from_slice(&total_len.to_le_bytes());
    buf.extend_from_slice(&attr_type.to_le_bytes());
    buf.extend_from_slice(&value.to_le_bytes());
}

fn push_attr_u8(buf: &mut Vec<u8>, attr_type: u16, value: u8) {
    let total_len = (NLA_HDR_LEN + 1) as u16;
    buf.extend_from_slice(&total_len.to_le_bytes());
    buf.extend_from_slice(&attr_type.to_le_bytes());
    buf.push(value);
    let pad = padded_len(total_len as usize) - total_len as usize;
    buf.extend(std::iter::repeat(0u8).take(pad));
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("payload is missing the required pid attribute")]
    MissingPid,
    #[error("payload repeats attribute type {0}")]
    DuplicateAttribute(u16),
    #[error("payload contains unknown attribute type {0}")]
    UnknownAttribute(u16),
    #[error("payload is truncated")]
    Truncated,
}

struct AttrIter<'a> {
    input: &'a [u8],
}

impl<'a> AttrIter<'a> {
    fn new(input: &'a [u8]) -> Self {
        AttrIter { input }
    }
}

impl<'a> Iterator for AttrIter<'a> {
    /// (attribute type, value bytes)
    type Item = Result<(u16, &'a [u8]), WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.input.is_empty() {
            return None;
        }
        let mut rest = self.input;
        let len = match le_u16::<_, winnow::error::ContextError>.parse_next(&mut rest) {
            Ok(v) => v,
            Err(_) => return Some(Err(WireError::Truncated)),
        };
        let attr_type = match le_u16::<_, winnow::error::ContextError>.parse_next(&mut rest) {
            Ok(v) => v,
            Err(_) => return Some(Err(WireError::Truncated)),
        };
        let value_len = (len as usize).saturating_sub(NLA_HDR_LEN);
        let value = match take::<_, _, winnow::error::ContextError>(value_len).parse_next(&mut rest)
        {
            Ok(v) => v,
            Err(_) => return Some(Err(WireError::Truncated)),
        };
        let advance = padded_len(len as usize).min(self.input.len());
        self.input = &self.input[advance..];
        Some(Ok((attr_type, value)))
    }
}

fn parse_u32(bytes: &[u8]) -> Result<u32, WireError> {
    let mut rest = bytes;
    le_u32::<_, winnow::error::ContextError>
        .parse_next(&mut rest)
        .map_err(|_| WireError::Truncated)
}

fn parse_u8(bytes: &[u8]) -> Result<u8, WireError> {
    bytes.first().copied().ok_or(WireError::Truncated)
}

/// Request to start or stop monitoring a pid for caught signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadMonitorProcess {
    pub pid: u32,
    pub watch: u8,
}

impl PayloadMonitorProcess {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        push_attr_u32(&mut buf, ATTRIBUTE_PID, self.pid);
        push_attr_u8(&mut buf, ATTRIBUTE_DO_WATCH, self.watch);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let mut pid: Option<u32> = None;
        let mut watch: Option<u8> = None;

        for attr in AttrIter::new(data) {
            let (attr_type, value) = attr?;
            match attr_type {
                ATTRIBUTE_PID => {
                    if pid.is_some() {
                        return Err(WireError::DuplicateAttribute(ATTRIBUTE_PID));
                    }
                    pid = Some(parse_u32(value)?);
                }
                ATTRIBUTE_DO_WATCH => {
                    if watch.is_some() {
                        return Err(WireError::DuplicateAttribute(ATTRIBUTE_DO_WATCH));
                    }
                    watch = Some(parse_u8(value)?);
                }
                other => return Err(WireError::UnknownAttribute(other)),
            }
        }

        let pid = pid.ok_or(WireError::MissingPid)?;
        let watch = watch.unwrap_or(ACTION_UNWATCH_PROCESS);
        Ok(PayloadMonitorProcess { pid, watch })
    }
}

/// A signal the kernel reports as caught by a watched pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadCaughtSignal {
    pub pid: u32,
    pub signal: u32,
}

impl PayloadCaughtSignal {
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let mut pid: Option<u32> = None;
        let mut signal: Option<u32> = None;

        for attr in AttrIter::new(data) {
            let (attr_type, value) = attr?;
            match attr_type {
                ATTRIBUTE_PID => {
                    if pid.is_some() {
                        return Err(WireError::DuplicateAttribute(ATTRIBUTE_PID));
                    }
                    pid = Some(parse_u32(value)?);
                }
                ATTRIBUTE_SIGNAL_NOTIFICATION_SIGNAL => {
                    if signal.is_some() {
                        return Err(WireError::DuplicateAttribute(
                            ATTRIBUTE_SIGNAL_NOTIFICATION_SIGNAL,
                        ));
                    }
                    signal = Some(parse_u32(value)?);
                }
                other => return Err(WireError::UnknownAttribute(other)),
            }
        }

        let pid = pid.ok_or(WireError::MissingPid)?;
        let signal = signal.unwrap_or(0);
        Ok(PayloadCaughtSignal { pid, signal })
    }

    #[cfg(test)]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        push_attr_u32(&mut buf, ATTRIBUTE_PID, self.pid);
        push_attr_u32(&mut buf, ATTRIBUTE_SIGNAL_NOTIFICATION_SIGNAL, self.signal);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_process_roundtrips() {
        let payload = PayloadMonitorProcess {
            pid: 4242,
            watch: ACTION_WATCH_PROCESS,
        };
        let encoded = payload.encode();
        let decoded = PayloadMonitorProcess::decode(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn caught_signal_roundtrips() {
        let payload = PayloadCaughtSignal {
            pid: 777,
            signal: 11,
        };
        let encoded = payload.encode();
        let decoded = PayloadCaughtSignal::decode(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn decode_rejects_missing_pid() {
        let mut buf = Vec::new();
        push_attr_u32(&mut buf, ATTRIBUTE_SIGNAL_NOTIFICATION_SIGNAL, 9);
        let err = PayloadCaughtSignal::decode(&buf).unwrap_err();
        assert_eq!(err, WireError::MissingPid);
    }

    #[test]
    fn decode_rejects_duplicate_pid() {
        let mut buf = Vec::new();
        push_attr_u32(&mut buf, ATTRIBUTE_PID, 1);
        push_attr_u32(&mut buf, ATTRIBUTE_PID, 2);
        let err = PayloadCaughtSignal::decode(&buf).unwrap_err();
        assert_eq!(err, WireError::DuplicateAttribute(ATTRIBUTE_PID));
    }

    #[test]
    fn decode_rejects_unknown_attribute() {
        let mut buf = Vec::new();
        push_attr_u32(&mut buf, ATTRIBUTE_PID, 1);
        push_attr_u32(&mut buf, 99, 1);
        let err = PayloadCaughtSignal::decode(&buf).unwrap_err();
        assert_eq!(err, WireError::UnknownAttribute(99));
    }
}
