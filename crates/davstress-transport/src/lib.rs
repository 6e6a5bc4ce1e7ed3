//! WebDAV transport capability set: the external collaborator the
//! traversal engine (`davstress-core`) drives but never constructs itself.

pub mod webdav_client;

pub use webdav_client::{
    HostMapping, Outcome, OptionsOutcome, WebdavCredentials, WebdavTransport,
    WebdavTransportConfig,
};
