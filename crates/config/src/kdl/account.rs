//! ACME, storage and account KDL parsing.

use anyhow::Result;
use std::path::PathBuf;
use tracing::trace;

use crate::account::*;

use super::helpers::{
    get_bool_entry, get_child_block, get_first_arg_string, get_int_entry, get_string_entry,
};

/// Parse the `acme { ... }` block
///
/// An explicit `directory` wins over `staging`; without either the
/// Let's Encrypt production directory is used.
pub fn parse_acme_config(node: &kdl::KdlNode) -> Result<AcmeConfig> {
    trace!("Parsing acme configuration block");

    let staging = get_bool_entry(node, "staging").unwrap_or(false);
    let directory_url = get_string_entry(node, "directory").unwrap_or_else(|| {
        if staging {
            LETSENCRYPT_STAGING_DIRECTORY.to_string()
        } else {
            LETSENCRYPT_PRODUCTION_DIRECTORY.to_string()
        }
    });

    let timeout_secs = match get_int_entry(node, "timeout-secs") {
        Some(v) => u64::try_from(v).map_err(|_| {
            anyhow::anyhow!("acme 'timeout-secs' must be a positive integer, got {}", v)
        })?,
        None => default_timeout_secs(),
    };

    let config = AcmeConfig {
        directory_url,
        timeout_secs,
        user_agent: get_string_entry(node, "user-agent").unwrap_or_else(default_user_agent),
    };

    trace!(
        directory_url = %config.directory_url,
        timeout_secs = config.timeout_secs,
        staging = staging,
        "Parsed acme configuration"
    );

    Ok(config)
}

/// Parse the `storage { ... }` block
pub fn parse_storage_config(node: &kdl::KdlNode) -> Result<StorageConfig> {
    trace!("Parsing storage configuration block");

    Ok(StorageConfig {
        path: get_string_entry(node, "path")
            .map(PathBuf::from)
            .unwrap_or_else(default_storage_path),
    })
}

/// Parse an `account "<name>" { ... }` block
pub fn parse_account(node: &kdl::KdlNode) -> Result<AccountConfig> {
    let name = get_first_arg_string(node).ok_or_else(|| {
        anyhow::anyhow!("Account requires a name argument, e.g., account \"primary\" {{ ... }}")
    })?;

    trace!(account = %name, "Parsing account");

    let key_file = get_string_entry(node, "key-file").ok_or_else(|| {
        anyhow::anyhow!(
            "Account '{}' requires a 'key-file' field, e.g., key-file \"/etc/acme/account.pem\"",
            name
        )
    })?;

    let email = get_string_entry(node, "email").ok_or_else(|| {
        anyhow::anyhow!(
            "Account '{}' requires an 'email' field, e.g., email \"admin@example.com\"",
            name
        )
    })?;

    let external_account_binding = get_child_block(node, "external-account-binding")
        .map(|eab| parse_external_account_binding(&name, eab))
        .transpose()?;

    trace!(
        account = %name,
        key_file = %key_file,
        eab = external_account_binding.is_some(),
        "Parsed account"
    );

    Ok(AccountConfig {
        name,
        key_file: PathBuf::from(key_file),
        email,
        external_account_binding,
    })
}

fn parse_external_account_binding(account: &str, node: &kdl::KdlNode) -> Result<EabConfig> {
    let key_id = get_string_entry(node, "key-id").ok_or_else(|| {
        anyhow::anyhow!(
            "Account '{}' external-account-binding requires a 'key-id' field",
            account
        )
    })?;
    let hmac_base64 = get_string_entry(node, "hmac-base64").ok_or_else(|| {
        anyhow::anyhow!(
            "Account '{}' external-account-binding requires an 'hmac-base64' field",
            account
        )
    })?;

    Ok(EabConfig {
        key_id,
        hmac_base64,
    })
}
