//! Shared MySQL server for the MySQL backend tests.
//!
//! One container is started for the whole test run, the first time a test
//! asks for it. Tests create and drop their own databases on it.

use std::sync::{Mutex, OnceLock};

use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::mysql::Mysql;

/// Runtime that owns the container for the lifetime of the test binary.
static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();

static MYSQL: Mutex<Option<ContainerAsync<Mysql>>> = Mutex::new(None);

static MYSQL_PORT: OnceLock<u16> = OnceLock::new();

fn runtime() -> &'static tokio::runtime::Runtime {
    RUNTIME.get_or_init(|| tokio::runtime::Runtime::new().expect("failed to create tokio runtime"))
}

fn mysql_port() -> u16 {
    *MYSQL_PORT.get_or_init(|| {
        runtime().block_on(async {
            let container = Mysql::default()
                .start()
                .await
                .expect("failed to start mysql container");
            let port = container
                .get_host_port_ipv4(3306)
                .await
                .expect("failed to get mysql port");
            *MYSQL.lock().unwrap() = Some(container);
            port
        })
    })
}

/// `mysql://root@127.0.0.1:<port>`, with no database selected.
///
/// The image allows a passwordless root login.
pub fn mysql_server_uri() -> String {
    format!("mysql://root@127.0.0.1:{}", mysql_port())
}

#[ctor::dtor]
fn stop_shared_mysql() {
    let Some(rt) = RUNTIME.get() else {
        return;
    };
    let Ok(mut guard) = MYSQL.lock() else {
        return;
    };
    if let Some(container) = guard.take() {
        rt.block_on(async move { drop(container) });
    }
}
