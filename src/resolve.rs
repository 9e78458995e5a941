//! Blocking name resolution.
//!
//! Grounded on the original source's `ipv4::detail::host_resolver_service`:
//! a thin synchronous facade over the platform resolver. No asynchronous
//! variant is offered — see `SPEC_FULL.md` §4.7.

use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::{Error, ErrorKind, Result};

/// Resolve `host`/`service` to every matching socket address, via the
/// platform's resolver (`getaddrinfo` on Unix, `GetAddrInfoW` on Windows,
/// both reached through `std::net::ToSocketAddrs`). `service` must be a
/// numeric port; named services (`"http"`, `/etc/services` lookups) are not
/// supported, matching the original's IP-only resolver and unlike the full
/// `getaddrinfo` surface.
///
/// Every I/O failure from the lookup itself is reported as
/// `ErrorKind::HostNotFound`, not the generic OS-error passthrough the
/// socket layer uses, since a resolver failure is never meaningfully an
/// `errno` the caller would act on differently.
pub fn resolve(host: &str, service: &str) -> Result<Vec<SocketAddr>> {
    let port: u16 = service
        .parse()
        .map_err(|_| Error::new(ErrorKind::InvalidArgument))?;
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|_| Error::new(ErrorKind::HostNotFound))?;
    Ok(addrs.collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_loopback() {
        let addrs = resolve("127.0.0.1", "80").unwrap();
        assert!(addrs.iter().any(|a| a.ip().is_loopback()));
    }

    #[test]
    fn rejects_non_numeric_service() {
        let err = resolve("127.0.0.1", "http").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
