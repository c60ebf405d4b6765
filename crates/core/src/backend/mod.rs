//! Backend adapters
//!
//! A backend hands out one [`BackendClient`] per viewer. The client carries
//! that viewer's session and implements both capabilities the app consumes.

mod local;
mod supabase;
mod users;

use std::sync::Arc;

pub use local::{LocalBackend, LocalClient, LocalConfig};
pub use supabase::{SupabaseBackend, SupabaseClient, SupabaseConfig};
pub use users::UserDirectory;

use crate::session::SessionStore;
use crate::task::TaskStore;

/// The two capabilities of one viewer's connection
#[derive(Clone)]
pub struct BackendClient {
    pub sessions: Arc<dyn SessionStore>,
    pub tasks: Arc<dyn TaskStore>,
}

impl BackendClient {
    /// Use one object for both capabilities
    pub fn from_shared<C>(client: Arc<C>) -> Self
    where
        C: SessionStore + TaskStore + 'static,
    {
        Self {
            sessions: Arc::clone(&client) as Arc<dyn SessionStore>,
            tasks: client as Arc<dyn TaskStore>,
        }
    }
}

pub trait Backend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Open a connection for a new viewer, initially signed out
    fn connect(&self) -> BackendClient;
}
