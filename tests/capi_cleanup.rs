//
// `webdav_cleanup` tears down the whole process-wide registry, so it
// gets a test binary of its own.
//

use std::ffi::CString;
use std::net::TcpListener;
use std::ptr;

use libc::c_int;

use dav_embed::capi::*;

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[test]
fn cleanup_stops_and_invalidates_everything() {
    let dir = tempfile::tempdir().unwrap();
    let address = CString::new("127.0.0.1").unwrap();
    let directory = CString::new(dir.path().to_str().unwrap()).unwrap();

    let ports = [free_port(), free_port()];
    let mut handles = Vec::new();
    for port in ports {
        let handle = unsafe {
            webdav_create_server(
                address.as_ptr(),
                port as c_int,
                directory.as_ptr(),
                ptr::null(),
                ptr::null(),
                0,
                ptr::null(),
                ptr::null(),
                ptr::null(),
                0,
                0,
                0,
            )
        };
        assert!(handle > 0);
        assert_eq!(webdav_start_server(handle), WEBDAV_SUCCESS);
        handles.push(handle);
    }

    webdav_cleanup();

    for handle in handles {
        assert_eq!(webdav_start_server(handle), WEBDAV_ERROR_SERVER_NOT_FOUND);
        assert_eq!(webdav_stop_server(handle), WEBDAV_ERROR_SERVER_NOT_FOUND);
        let mut buffer = [0 as libc::c_char; 256];
        let code =
            unsafe { webdav_get_server_info(handle, buffer.as_mut_ptr(), buffer.len() as c_int) };
        assert_eq!(code, WEBDAV_ERROR_SERVER_NOT_FOUND);
    }

    // the listeners are gone
    for port in ports {
        let rebound = TcpListener::bind(("127.0.0.1", port)).unwrap();
        drop(rebound);
    }

    // a second cleanup with zero instances is fine
    webdav_cleanup();
}
