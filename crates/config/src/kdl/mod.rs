//! KDL document parsing.

mod account;
mod helpers;

use anyhow::Result;
use tracing::{debug, trace};

use crate::Config;

pub use account::{parse_account, parse_acme_config, parse_storage_config};

/// Build a [`Config`] from a parsed KDL document
///
/// Recognised top-level nodes are `acme`, `storage` and `account`;
/// anything else is rejected so typos surface immediately.
pub fn parse_document(doc: &kdl::KdlDocument) -> Result<Config> {
    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "acme" => config.acme = parse_acme_config(node)?,
            "storage" => config.storage = parse_storage_config(node)?,
            "account" => config.accounts.push(parse_account(node)?),
            other => {
                return Err(anyhow::anyhow!(
                    "Unknown top-level configuration node '{}'. Valid nodes: acme, storage, account",
                    other
                ));
            }
        }
        trace!(node = %node.name().value(), "Parsed top-level node");
    }

    debug!(
        directory_url = %config.acme.directory_url,
        account_count = config.accounts.len(),
        "Parsed configuration document"
    );

    Ok(config)
}
