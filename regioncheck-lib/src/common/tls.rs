use std::sync::{Arc, LazyLock};

use rustls::RootCertStore;

pub static GLOBAL_ROOT_STORE: LazyLock<Arc<RootCertStore>> =
    LazyLock::new(global_root_store);

fn global_root_store() -> Arc<RootCertStore> {
    let mut store = RootCertStore::empty();
    store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Arc::new(store)
}
