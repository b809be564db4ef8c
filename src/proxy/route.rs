//! Service routes.
//!
//! A route is a static 1:1 mapping from a public listen port to a backend
//! address. The route set is fixed for the process lifetime; only the
//! backend host is supplied externally.

/// Static mapping from a public listen port to a backend address.
#[derive(Debug, Clone)]
pub struct Route {
    /// Public port the listener binds.
    pub listen_port: u16,
    /// Internal host the route forwards to.
    pub backend_host: String,
    /// Port on the backend host.
    pub backend_port: u16,
    /// Human-readable service name, used in logs and connection records.
    pub name: String,
}

impl Route {
    /// Create a new route.
    pub fn new(listen_port: u16, backend_host: &str, backend_port: u16, name: &str) -> Self {
        Self {
            listen_port,
            backend_host: backend_host.to_string(),
            backend_port,
            name: name.to_string(),
        }
    }

    /// Backend dial target in `host:port` form.
    pub fn backend_addr(&self) -> String {
        format!("{}:{}", self.backend_host, self.backend_port)
    }
}
