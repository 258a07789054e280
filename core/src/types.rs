//! Session records and the storage-key contract.
//!
//! # Design
//! These keys mirror what the login page persists; the client only ever
//! reads `usuario` and clears the trio on expiry. `moduloSelecionado` is
//! deliberately left untouched by [`clear_session`] so the login page can
//! send the user back to where they were.

use serde::{Deserialize, Serialize};

use crate::ports::SessionStore;

pub const STORAGE_USUARIO: &str = "usuario";
pub const STORAGE_IS_ADMIN: &str = "isAdmin";
pub const STORAGE_IS_ROOT: &str = "isRoot";
pub const STORAGE_MODULO: &str = "moduloSelecionado";

/// The locally persisted user record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usuario {
    pub id: i64,
    pub nome: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_root: bool,
}

/// Read and parse the persisted user record, if any. A record that no
/// longer parses is treated as absent.
pub fn load_usuario(store: &dyn SessionStore) -> Option<Usuario> {
    let raw = store.get(STORAGE_USUARIO)?;
    serde_json::from_str(&raw).ok()
}

/// Persist the user record and mirror the quick-check boolean flags.
pub fn save_usuario(store: &dyn SessionStore, usuario: &Usuario) -> Result<(), serde_json::Error> {
    let raw = serde_json::to_string(usuario)?;
    store.set(STORAGE_USUARIO, &raw);
    store.set(STORAGE_IS_ADMIN, if usuario.is_admin { "true" } else { "false" });
    store.set(STORAGE_IS_ROOT, if usuario.is_root { "true" } else { "false" });
    Ok(())
}

/// Remove the user record and its mirrored flags. Keeps
/// `moduloSelecionado` for the post-login redirect.
pub fn clear_session(store: &dyn SessionStore) {
    store.remove(STORAGE_USUARIO);
    store.remove(STORAGE_IS_ADMIN);
    store.remove(STORAGE_IS_ROOT);
}
