//! Role entry points (§4.J/§6): each function builds and runs one of the
//! pipelines `examples/original_source/src/index.py`'s `TYPE` dispatch and
//! `lambda.py`'s `handler` route to, driven by the `TYPE`/Lambda-event
//! value read at process startup.

pub mod key_naming;
pub mod lambda_handlers;
pub mod master;
pub mod worker_ftp;
pub mod worker_json;
pub mod worker_sort;
