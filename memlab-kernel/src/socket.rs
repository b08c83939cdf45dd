// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A thin wrapper over a blocking generic-netlink socket.
//!
//! `netlink-sys` does not expose an async socket for every target, so the
//! blocking socket is driven from a dedicated `spawn_blocking` task rather
//! than polled directly: park the blocking resource on its own task and
//! hand results back over a channel.

use std::os::unix::io::AsRawFd;

use netlink_sys::{protocols::NETLINK_GENERIC, Socket, SocketAddr};

use crate::KernelError;

const SOL_NETLINK: libc::c_int = 270;
const NETLINK_ADD_MEMBERSHIP: libc::c_int = 1;

pub struct NetlinkSocket {
    inner: Socket,
}

impl NetlinkSocket {
    pub fn bind() -> Result<Self, KernelError> {
        let mut socket =
            Socket::new(NETLINK_GENERIC).map_err(|e| KernelError::Dial(e.to_string()))?;
        socket
            .bind(&SocketAddr::new(0, 0))
            .map_err(|e| KernelError::Dial(e.to_string()))?;
        Ok(NetlinkSocket { inner: socket })
    }

    pub fn send(&self, buf: &[u8]) -> Result<(), KernelError> {
        self.inner
            .send(buf, 0)
            .map(|_| ())
            .map_err(|e| KernelError::Send(e.to_string()))
    }

    pub fn recv(&self, buf: &mut [u8]) -> Result<usize, KernelError> {
        match self.inner.recv_from(buf, 0) {
            Ok((len, _addr)) => Ok(len),
            Err(err) => {
                if err.raw_os_error() == Some(libc::EBADF) {
                    Err(KernelError::Closed)
                } else {
                    Err(KernelError::Recv(err.to_string()))
                }
            }
        }
    }

    /// Joins the multicast group identified by `group_id`, the
    /// `NETLINK_ADD_MEMBERSHIP` sockopt `netlink-sys` does not wrap
    /// directly.
    pub fn join_multicast_group(&self, group_id: u32) -> Result<(), KernelError> {
        let fd = self.inner.as_raw_fd();
        let group_id = group_id as libc::c_int;
        let ret = unsafe {
            libc::setsockopt(
                fd,
                SOL_NETLINK,
                NETLINK_ADD_MEMBERSHIP,
                &group_id as *const libc::c_int as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret != 0 {
            return Err(KernelError::Dial(
                std::io::Error::last_os_error().to_string(),
            ));
        }
        Ok(())
    }

    /// Closes the underlying file descriptor, unblocking any in-progress
    /// `recv` on another thread with `EBADF`.
    pub fn close(self) {
        drop(self.inner);
    }

    pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
        self.inner.as_raw_fd()
    }
}
