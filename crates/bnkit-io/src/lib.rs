//! # bnkit io
//!
//! File formats for [`bnkit_core::Network`]:
//!
//! - **xml**: XMLBIF interchange, read and write, lossless
//! - **bif**: BIF text export
//! - **net**: Hugin NET export
//! - **mangle**: identifier mangling shared by the text exports

#![forbid(unsafe_code)]

pub mod bif;
pub mod errors;
pub mod mangle;
pub mod net;
pub mod xml;

use bnkit_core::Network;

pub use bif::write_bif;
pub use errors::{IoError, IoResult};
pub use mangle::{mangle, IdentifierTable};
pub use net::write_net;
pub use xml::{read_xml, read_xml_file, write_xml, write_xml_file};

/// Output formats supported by [`export`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Xml,
    Bif,
    Net,
}

impl Format {
    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Xml => "xml",
            Format::Bif => "bif",
            Format::Net => "net",
        }
    }
}

pub fn export(network: &Network, format: Format) -> String {
    match format {
        Format::Xml => write_xml(network),
        Format::Bif => write_bif(network),
        Format::Net => write_net(network),
    }
}
