// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Best-effort `/proc`-based lookup of a process's open network
//! connections. `sysinfo` does not expose per-process sockets, so this
//! walks `/proc/<pid>/fd` to collect socket inodes and cross-references
//! them against the host-wide connection tables in `/proc/net/{tcp,tcp6}`.
//! Any failure (missing `/proc`, permission denied, process already gone)
//! yields an empty list rather than an error: a metadata snapshot is still
//! useful without connections.

use std::collections::HashMap;
use std::fs;

use serde::Serialize;

const MAX_CONNECTIONS: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct NetworkConnection {
    pub local_address: String,
    pub local_port: u16,
    pub remote_address: String,
    pub remote_port: u16,
    pub protocol: &'static str,
}

pub fn connections_for_pid(pid: u32) -> Vec<NetworkConnection> {
    let inodes = match socket_inodes_for_pid(pid) {
        Some(inodes) => inodes,
        None => return Vec::new(),
    };
    if inodes.is_empty() {
        return Vec::new();
    }

    let mut table = HashMap::new();
    for (path, protocol) in [
        ("/proc/net/tcp", "tcp"),
        ("/proc/net/tcp6", "tcp6"),
        ("/proc/net/udp", "udp"),
        ("/proc/net/udp6", "udp6"),
    ] {
        if let Ok(contents) = fs::read_to_string(path) {
            parse_proc_net(&contents, protocol, &mut table);
        }
    }

    let mut connections = Vec::new();
    for inode in inodes {
        if let Some(conn) = table.get(&inode) {
            connections.push(conn.clone());
            if connections.len() >= MAX_CONNECTIONS {
                break;
            }
        }
    }
    connections
}

fn socket_inodes_for_pid(pid: u32) -> Option<Vec<u64>> {
    let fd_dir = format!("/proc/{pid}/fd");
    let entries = fs::read_dir(fd_dir).ok()?;
    let mut inodes = Vec::new();
    for entry in entries.flatten() {
        if let Ok(target) = fs::read_link(entry.path()) {
            if let Some(name) = target.to_str() {
                if let Some(inode) = parse_socket_inode(name) {
                    inodes.push(inode);
                }
            }
        }
    }
    Some(inodes)
}

fn parse_socket_inode(link: &str) -> Option<u64> {
    let inner = link.strip_prefix("socket:[")?.strip_suffix(']')?;
    inner.parse().ok()
}

fn parse_proc_net(contents: &str, protocol: &'static str, out: &mut HashMap<u64, NetworkConnection>) {
    for line in contents.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        let (local, remote, inode_field) = (fields[1], fields[2], fields[9]);
        let inode: u64 = match inode_field.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let (local_address, local_port) = match parse_hex_addr(local) {
            Some(v) => v,
            None => continue,
        };
        let (remote_address, remote_port) = match parse_hex_addr(remote) {
            Some(v) => v,
            None => continue,
        };
        out.insert(
            inode,
            NetworkConnection {
                local_address,
                local_port,
                remote_address,
                remote_port,
                protocol,
            },
        );
    }
}

fn parse_hex_addr(field: &str) -> Option<(String, u16)> {
    let mut parts = field.split(':');
    let addr_hex = parts.next()?;
    let port_hex = parts.next()?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    let address = if addr_hex.len() == 8 {
        let bytes = u32::from_str_radix(addr_hex, 16).ok()?.to_be_bytes();
        format!("{}.{}.{}.{}", bytes[3], bytes[2], bytes[1], bytes[0])
    } else {
        addr_hex.to_owned()
    };

    Some((address, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4_hex_address() {
        let (addr, port) = parse_hex_addr("0100007F:1F90").unwrap();
        assert_eq!(addr, "127.0.0.1");
        assert_eq!(port, 8080);
    }

    #[test]
    fn parses_socket_inode_link() {
        assert_eq!(parse_socket_inode("socket:[12345]"), Some(12345));
        assert_eq!(parse_socket_inode("/dev/null"), None);
    }
}
