//! Server plugins.

use std::future::Future;
use std::pin::Pin;

use crate::error::DispatchResult;
use crate::server::Server;

/// Future returned by [`ServerPlugin::on_enable`].
pub type PluginFuture<'a> = Pin<Box<dyn Future<Output = DispatchResult<()>> + Send + 'a>>;

/// A bundle of streams and serializers installed when the server starts.
pub trait ServerPlugin: Send + Sync + 'static {
    /// Unique plugin name, compared ignoring case.
    fn name(&self) -> &str;

    /// Register this plugin's streams and serializers with `server`.
    fn on_enable<'a>(&'a self, server: &'a Server) -> PluginFuture<'a>;
}
