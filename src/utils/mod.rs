pub mod revoked_tokens;
