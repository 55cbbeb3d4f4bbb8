//! Embedding storage encoding and sqlite-vec registration.
//!
//! Embeddings are stored as little-endian `f32` BLOBs, which is the native
//! float32 vector format of sqlite-vec. The distance functions
//! (`vec_distance_cosine`, `vec_f32`, `vec_version`) are registered on every
//! pooled connection when it is opened.

use std::ffi::{c_char, c_int, c_void};

use sqlx::SqliteConnection;

type ExtensionInit = unsafe extern "C" fn(*mut c_void, *mut *mut c_char, *const c_void) -> c_int;

const SQLITE_OK: c_int = 0;

/// Convert an f32 vector to a BLOB for SQLite storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a SQLite BLOB back to an f32 vector.
///
/// Trailing bytes that do not form a whole component are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Register the sqlite-vec functions on a freshly opened connection.
///
/// sqlite-vec is compiled into the binary with `SQLITE_CORE`, so its entry
/// point talks to the same statically linked SQLite that sqlx uses and does
/// not need the extension API routine table.
pub async fn register_vec_functions(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let mut handle = conn.lock_handle().await?;
    let db = handle.as_raw_handle().as_ptr().cast::<c_void>();

    // SAFETY: `sqlite3_vec_init` has the standard extension entry-point ABI;
    // the crate only declares it without arguments. `db` is a live handle
    // exclusively locked for the duration of the call.
    let rc = unsafe {
        let init: ExtensionInit = std::mem::transmute::<unsafe extern "C" fn(), ExtensionInit>(
            sqlite_vec::sqlite3_vec_init as unsafe extern "C" fn(),
        );
        init(db, std::ptr::null_mut(), std::ptr::null())
    };

    if rc != SQLITE_OK {
        return Err(sqlx::Error::Configuration(
            format!("sqlite-vec initialization failed with code {rc}").into(),
        ));
    }
    Ok(())
}
