// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Minimal generic-netlink framing: enough to resolve a family by name,
//! join its multicast group, and exchange request/notification messages.
//! Hand-frames the handful of message shapes the communicator needs on
//! top of `netlink-sys` and `zerocopy` rather than pulling in a
//! general-purpose genetlink crate for this small a surface.

use zerocopy::{Immutable, IntoBytes, KnownLayout};

pub const NLMSG_HDR_LEN: usize = 16;
pub const GENL_HDR_LEN: usize = 4;

pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_ACK: u16 = 0x04;

pub const GENL_ID_CTRL: u16 = 0x10;

pub const CTRL_CMD_GETFAMILY: u8 = 3;
pub const CTRL_ATTR_FAMILY_ID: u16 = 1;
pub const CTRL_ATTR_FAMILY_NAME: u16 = 2;
pub const CTRL_ATTR_MCAST_GROUPS: u16 = 7;
pub const CTRL_ATTR_MCAST_GRP_NAME: u16 = 1;
pub const CTRL_ATTR_MCAST_GRP_ID: u16 = 2;

#[derive(IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
struct NlMsgHdr {
    len: u32,
    msg_type: u16,
    flags: u16,
    seq: u32,
    pid: u32,
}

#[derive(IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
struct GenlMsgHdr {
    cmd: u8,
    version: u8,
    reserved: u16,
}

fn nla_pad(len: usize) -> usize {
    (len + 3) & !3
}

fn push_string_attr(buf: &mut Vec<u8>, attr_type: u16, value: &str) {
    let mut bytes = value.as_bytes().to_vec();
    bytes.push(0);
    let total_len = (4 + bytes.len()) as u16;
    buf.extend_from_slice(&total_len.to_le_bytes());
    buf.extend_from_slice(&attr_type.to_le_bytes());
    buf.extend_from_slice(&bytes);
    let pad = nla_pad(total_len as usize) - total_len as usize;
    buf.extend(std::iter::repeat(0u8).take(pad));
}

/// Builds a `CTRL_CMD_GETFAMILY` request asking the kernel to resolve
/// `family_name` to a numeric family id and its multicast groups.
pub fn build_getfamily_request(seq: u32, family_name: &str) -> Vec<u8> {
    let mut attrs = Vec::new();
    push_string_attr(&mut attrs, CTRL_ATTR_FAMILY_NAME, family_name);

    let genl_hdr = GenlMsgHdr {
        cmd: CTRL_CMD_GETFAMILY,
        version: 1,
        reserved: 0,
    };
    let body_len = GENL_HDR_LEN + attrs.len();
    let nl_hdr = NlMsgHdr {
        len: (NLMSG_HDR_LEN + body_len) as u32,
        msg_type: GENL_ID_CTRL,
        flags: NLM_F_REQUEST | NLM_F_ACK,
        seq,
        pid: 0,
    };

    let mut out = Vec::with_capacity(nl_hdr.len as usize);
    out.extend_from_slice(nl_hdr.as_bytes());
    out.extend_from_slice(genl_hdr.as_bytes());
    out.extend_from_slice(&attrs);
    out
}

/// Builds a request to `family_id` carrying the given command and
/// already-encoded attribute TLVs.
pub fn build_command_request(seq: u32, family_id: u16, cmd: u8, attrs: &[u8]) -> Vec<u8> {
    let genl_hdr = GenlMsgHdr {
        cmd,
        version: 1,
        reserved: 0,
    };
    let body_len = GENL_HDR_LEN + attrs.len();
    let nl_hdr = NlMsgHdr {
        len: (NLMSG_HDR_LEN + body_len) as u32,
        msg_type: family_id,
        flags: NLM_F_REQUEST,
        seq,
        pid: 0,
    };

    let mut out = Vec::with_capacity(nl_hdr.len as usize);
    out.extend_from_slice(nl_hdr.as_bytes());
    out.extend_from_slice(genl_hdr.as_bytes());
    out.extend_from_slice(attrs);
    out
}

/// A resolved family: its numeric id plus the multicast group ids keyed by
/// group name.
#[derive(Debug, Clone, Default)]
pub struct ResolvedFamily {
    pub id: u16,
    pub groups: Vec<(String, u32)>,
}

impl ResolvedFamily {
    pub fn group_id(&self, name: &str) -> Option<u32> {
        self.groups
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }
}

/// Parses a `CTRL_CMD_GETFAMILY` reply, skipping the netlink and generic
/// netlink headers, and walking the top-level attributes.
pub fn parse_getfamily_reply(msg: &[u8]) -> Option<ResolvedFamily> {
    if msg.len() < NLMSG_HDR_LEN + GENL_HDR_LEN {
        return None;
    }
    let body = &msg[NLMSG_HDR_LEN + GENL_HDR_LEN..];

    let mut family = ResolvedFamily::default();
    let mut offset = 0usize;
    while offset + 4 <= body.len() {
        let len = u16::from_le_bytes([body[offset], body[offset + 1]]) as usize;
        let attr_type = u16::from_le_bytes([body[offset + 2], body[offset + 3]]);
        if len < 4 || offset + len > body.len() {
            break;
        }
        let value = &body[offset + 4..offset + len];
        match attr_type {
            CTRL_ATTR_FAMILY_ID => {
                if value.len() >= 2 {
                    family.id = u16::from_le_bytes([value[0], value[1]]);
                }
            }
            CTRL_ATTR_MCAST_GROUPS => {
                family.groups = parse_mcast_groups(value);
            }
            _ => {}
        }
        offset += nla_pad(len);
    }

    Some(family)
}

fn parse_mcast_groups(nested: &[u8]) -> Vec<(String, u32)> {
    let mut groups = Vec::new();
    let mut offset = 0usize;
    // Each top-level entry here is itself a nested attribute (one per
    // group) whose index is the attribute type; its value is a further
    // nested CTRL_ATTR_MCAST_GRP_NAME / CTRL_ATTR_MCAST_GRP_ID pair.
    while offset + 4 <= nested.len() {
        let len = u16::from_le_bytes([nested[offset], nested[offset + 1]]) as usize;
        if len < 4 || offset + len > nested.len() {
            break;
        }
        let value = &nested[offset + 4..offset + len];
        if let Some(group) = parse_one_mcast_group(value) {
            groups.push(group);
        }
        offset += nla_pad(len);
    }
    groups
}

fn parse_one_mcast_group(value: &[u8]) -> Option<(String, u32)> {
    let mut name = None;
    let mut id = None;
    let mut offset = 0usize;
    while offset + 4 <= value.len() {
        let len = u16::from_le_bytes([value[offset], value[offset + 1]]) as usize;
        let attr_type = u16::from_le_bytes([value[offset + 2], value[offset + 3]]);
        if len < 4 || offset + len > value.len() {
            break;
        }
        let inner = &value[offset + 4..offset + len];
        match attr_type {
            CTRL_ATTR_MCAST_GRP_NAME => {
                let end = inner.iter().position(|b| *b == 0).unwrap_or(inner.len());
                name = std::str::from_utf8(&inner[..end]).ok().map(str::to_owned);
            }
            CTRL_ATTR_MCAST_GRP_ID => {
                if inner.len() >= 4 {
                    id = Some(u32::from_le_bytes([inner[0], inner[1], inner[2], inner[3]]));
                }
            }
            _ => {}
        }
        offset += nla_pad(len);
    }
    match (name, id) {
        (Some(name), Some(id)) => Some((name, id)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_getfamily_request_includes_family_name() {
        let req = build_getfamily_request(1, "memlab-ktu");
        assert!(req.len() > NLMSG_HDR_LEN + GENL_HDR_LEN);
        assert!(req
            .windows("memlab-ktu".len())
            .any(|w| w == b"memlab-ktu"));
    }
}
