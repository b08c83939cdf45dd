// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use memlab_types::CaughtSignal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::fanout::SignalFanout;
use crate::genl::{self, ResolvedFamily};
use crate::socket::NetlinkSocket;
use crate::wire::{self, PayloadCaughtSignal, PayloadMonitorProcess};
use crate::KernelError;

/// The memlab-side multicast group the kernel module publishes caught
/// signals on. There is exactly one group on the receive family.
const NOTIFY_GROUP: &str = "notify";

/// The operations a signal detector and the detector registry need from
/// a kernel communicator. Extracted as a trait so detectors can be
/// exercised against a fake in tests instead of a real netlink socket
/// pair, which only exist where the kernel module is loaded.
pub trait KernelClient: Send + Sync {
    fn watch_process(&self, pid: u32) -> Result<(), KernelError>;
    fn unwatch_process(&self, pid: u32) -> Result<(), KernelError>;
    fn notify_handled_signal(&self, pid: u32) -> Result<(), KernelError>;
    fn subscribe(&self) -> mpsc::UnboundedReceiver<CaughtSignal>;
}

/// Talks to the kernel module over two generic-netlink families: one to
/// send it requests (watch/unwatch/ack), one to receive its
/// notifications (caught signals). Shared by every detector that needs
/// kernel-sourced events; each detector subscribes independently and
/// filters to the pid it cares about.
pub struct KernelCommunicator {
    send_socket: NetlinkSocket,
    send_family_id: u16,
    seq: AtomicU32,
    caught_signals: Arc<SignalFanout>,
    reader: Mutex<Option<JoinHandle<NetlinkSocket>>>,
    recv_fd: std::os::unix::io::RawFd,
}

impl KernelCommunicator {
    /// Dials both families by name, failing fast if either does not
    /// exist. Joins every multicast group the receive family advertises
    /// and spawns the reader task immediately, so the communicator is
    /// ready to deliver notifications as soon as construction succeeds.
    pub async fn new(send_family: &str, recv_family: &str) -> Result<Self, KernelError> {
        let send_family = send_family.to_owned();
        let recv_family = recv_family.to_owned();

        let (send_socket, send_resolved, recv_socket, recv_resolved) =
            tokio::task::spawn_blocking(move || -> Result<_, KernelError> {
                let send_socket = NetlinkSocket::bind()?;
                let send_resolved = resolve_family(&send_socket, &send_family)?;

                let recv_socket = NetlinkSocket::bind()?;
                let recv_resolved = resolve_family(&recv_socket, &recv_family)?;

                Ok((send_socket, send_resolved, recv_socket, recv_resolved))
            })
            .await
            .map_err(|e| KernelError::Dial(e.to_string()))??;

        if let Some(group_id) = recv_resolved.group_id(NOTIFY_GROUP) {
            recv_socket.join_multicast_group(group_id)?;
        } else {
            warn!(family = %recv_resolved.id, "receive family advertises no notify group");
        }

        let recv_fd = recv_socket.raw_fd();
        let fanout = Arc::new(SignalFanout::new());

        let reader_fanout = Arc::clone(&fanout);
        let reader = tokio::task::spawn_blocking(move || reader_loop(recv_socket, reader_fanout));

        Ok(KernelCommunicator {
            send_socket,
            send_family_id: send_resolved.id,
            seq: AtomicU32::new(1),
            caught_signals: fanout,
            reader: Mutex::new(Some(reader)),
            recv_fd,
        })
    }

    /// Subscribes to the shared stream of caught-signal notifications,
    /// each subscriber over its own unbounded queue. Every subscriber
    /// sees every event; filtering to a specific pid is the caller's
    /// responsibility.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<CaughtSignal> {
        self.caught_signals.subscribe()
    }

    pub fn watch_process(&self, pid: u32) -> Result<(), KernelError> {
        self.send_monitor_process(pid, wire::ACTION_WATCH_PROCESS)
    }

    pub fn unwatch_process(&self, pid: u32) -> Result<(), KernelError> {
        self.send_monitor_process(pid, wire::ACTION_UNWATCH_PROCESS)
    }

    fn send_monitor_process(&self, pid: u32, watch: u8) -> Result<(), KernelError> {
        let attrs = PayloadMonitorProcess { pid, watch }.encode();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let msg = genl::build_command_request(
            seq,
            self.send_family_id,
            wire::send_command::MONITOR_PROCESS,
            &attrs,
        );
        self.send_socket.send(&msg)
    }

    /// Acknowledges that a caught signal has been handled, regardless of
    /// whether the operator pipeline that processed it succeeded.
    pub fn notify_handled_signal(&self, pid: u32) -> Result<(), KernelError> {
        let mut attrs = Vec::new();
        push_pid_attr(&mut attrs, pid);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let msg = genl::build_command_request(
            seq,
            self.send_family_id,
            wire::send_command::HANDLED_CAUGHT_SIGNAL,
            &attrs,
        );
        self.send_socket.send(&msg)
    }

    /// Closes both sockets. The reader task's blocking `recv` unblocks
    /// with an `EBADF`-equivalent error, which it treats as a normal
    /// shutdown rather than a fault.
    ///
    /// The reader task owns the receive `NetlinkSocket` for its entire
    /// lifetime, so closing its fd from here and letting the socket's own
    /// drop close it again would close the same fd number twice — a race
    /// against whatever the OS has since handed that number to. Instead
    /// this closes the fd directly to unblock the blocking `recv`, then
    /// takes the socket back from the joined task and forgets it rather
    /// than dropping it, since the fd is already gone.
    pub async fn close(self) {
        unsafe {
            libc::close(self.recv_fd);
        }
        self.send_socket.close();
        if let Some(handle) = self.reader.lock().unwrap_or_else(|e| e.into_inner()).take() {
            if let Ok(socket) = handle.await {
                std::mem::forget(socket);
            }
        }
    }
}

impl KernelClient for KernelCommunicator {
    fn watch_process(&self, pid: u32) -> Result<(), KernelError> {
        KernelCommunicator::watch_process(self, pid)
    }

    fn unwatch_process(&self, pid: u32) -> Result<(), KernelError> {
        KernelCommunicator::unwatch_process(self, pid)
    }

    fn notify_handled_signal(&self, pid: u32) -> Result<(), KernelError> {
        KernelCommunicator::notify_handled_signal(self, pid)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<CaughtSignal> {
        KernelCommunicator::subscribe(self)
    }
}

fn push_pid_attr(buf: &mut Vec<u8>, pid: u32) {
    let total_len: u16 = 8;
    buf.extend_from_slice(&total_len.to_le_bytes());
    buf.extend_from_slice(&wire::ATTRIBUTE_PID.to_le_bytes());
    buf.extend_from_slice(&pid.to_le_bytes());
}

fn resolve_family(socket: &NetlinkSocket, name: &str) -> Result<ResolvedFamily, KernelError> {
    let request = genl::build_getfamily_request(0, name);
    socket.send(&request)?;

    let mut buf = vec![0u8; 8192];
    let len = socket.recv(&mut buf)?;
    genl::parse_getfamily_reply(&buf[..len]).ok_or_else(|| KernelError::FamilyNotFound(name.to_owned()))
}

/// Drives the blocking receive socket until it's closed, handing back
/// ownership of the socket on exit so the caller controls exactly when
/// and how it's finally closed.
fn reader_loop(socket: NetlinkSocket, fanout: Arc<SignalFanout>) -> NetlinkSocket {
    let mut buf = vec![0u8; 8192];
    loop {
        match socket.recv(&mut buf) {
            Ok(len) => {
                if len < genl::NLMSG_HDR_LEN + genl::GENL_HDR_LEN {
                    continue;
                }
                let cmd = buf[genl::NLMSG_HDR_LEN];
                if cmd != wire::recv_command::NOTIFY_CAUGHT_SIGNAL {
                    debug!(cmd, "ignoring notification with unexpected command");
                    continue;
                }
                let attrs = &buf[genl::NLMSG_HDR_LEN + genl::GENL_HDR_LEN..len];
                match PayloadCaughtSignal::decode(attrs) {
                    Ok(payload) => {
                        fanout.publish(CaughtSignal {
                            pid: payload.pid,
                            signal: payload.signal,
                        });
                    }
                    Err(err) => {
                        debug!(%err, "dropping undecodable caught-signal notification");
                    }
                }
            }
            Err(KernelError::Closed) => return socket,
            Err(err) => {
                error!(%err, "error receiving from kernel notification socket");
                continue;
            }
        }
    }
}
