use crate::config::ConnectionSettings;
use crate::error::Result;
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, Scope, SearchEntry};
use tracing::{debug, error};

/// A directory-sourced identity: the entry's DN plus the attributes the
/// providers care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub username: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Resolves identities against the directory. Split out as a trait so the
/// providers can be exercised against a double.
#[async_trait]
pub trait ResolveUser: Send + Sync {
    /// Look up a single directory entry by username.
    async fn find_by_username(&self, username: &str) -> Result<Option<DirectoryEntry>>;

    /// Verify a password by binding as the entry.
    async fn authenticate(&self, entry: &DirectoryEntry, password: &str) -> Result<bool>;

    /// Enumerate all entries matched by the configured filter.
    async fn list(&self) -> Result<Vec<DirectoryEntry>>;
}

#[derive(Clone)]
pub struct LdapResolver {
    connection: ConnectionSettings,
}

impl LdapResolver {
    pub fn new(connection: ConnectionSettings) -> Self {
        Self { connection }
    }

    fn escape_filter_value(value: &str) -> String {
        value.replace('\\', "\\5c")
             .replace('*', "\\2a")
             .replace('(', "\\28")
             .replace(')', "\\29")
             .replace('\0', "\\00")
    }

    async fn connect(&self) -> Result<Ldap> {
        let (conn, mut ldap) = LdapConnAsync::new(&self.connection.url).await?;

        ldap3::drive!(conn);

        // Service bind, or anonymous when no bind DN is configured.
        let bind_result = if let Some(bind_dn) = &self.connection.bind_dn {
            let bind_pw = self.connection.bind_password.as_deref().unwrap_or("");
            ldap.simple_bind(bind_dn, bind_pw).await
        } else {
            ldap.simple_bind("", "").await
        };

        match bind_result {
            Ok(res) => {
                if let Err(e) = res.success() {
                    error!("LDAP service bind rejected: {}", e);
                    return Err(e.into());
                }
            }
            Err(e) => {
                error!("LDAP service bind failed: {}", e);
                return Err(e.into());
            }
        }

        Ok(ldap)
    }

    async fn search(&self, filter: &str) -> Result<Vec<DirectoryEntry>> {
        let mut ldap = self.connect().await?;

        let (rs, _res) = ldap
            .search(
                &self.connection.base_dn,
                Scope::Subtree,
                filter,
                vec!["dn", "uid", "mail", "cn"],
            )
            .await?
            .success()?;

        let entries = rs
            .into_iter()
            .map(|entry| Self::build_entry(SearchEntry::construct(entry)))
            .collect();

        Ok(entries)
    }

    fn build_entry(entry: SearchEntry) -> DirectoryEntry {
        let first = |attr: &str| entry.attrs.get(attr).and_then(|values| values.first().cloned());

        DirectoryEntry {
            username: first("uid").unwrap_or_else(|| entry.dn.clone()),
            email: first("mail"),
            display_name: first("cn"),
            dn: entry.dn,
        }
    }
}

#[async_trait]
impl ResolveUser for LdapResolver {
    async fn find_by_username(&self, username: &str) -> Result<Option<DirectoryEntry>> {
        let safe_username = Self::escape_filter_value(username);
        let filter = self.connection.user_filter.replace("{}", &safe_username);

        let entries = self.search(&filter).await?;

        if entries.is_empty() {
            debug!("Directory user not found: {}", username);
            return Ok(None);
        }

        if entries.len() > 1 {
            debug!("Directory user ambiguous (multiple matches): {}", username);
            return Ok(None);
        }

        Ok(entries.into_iter().next())
    }

    async fn authenticate(&self, entry: &DirectoryEntry, password: &str) -> Result<bool> {
        // An empty password would be an anonymous bind, which succeeds on
        // most servers.
        if password.is_empty() {
            return Ok(false);
        }

        let (conn, mut ldap) = LdapConnAsync::new(&self.connection.url).await?;

        ldap3::drive!(conn);

        match ldap.simple_bind(&entry.dn, password).await {
            Ok(res) => {
                let success = res.success().is_ok();
                if !success {
                    debug!("Directory password verification failed for {}", entry.username);
                }
                Ok(success)
            }
            Err(e) => {
                debug!("Directory bind error for user {}: {}", entry.username, e);
                Ok(false)
            }
        }
    }

    async fn list(&self) -> Result<Vec<DirectoryEntry>> {
        let filter = self.connection.user_filter.replace("{}", "*");
        self.search(&filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_filter_metacharacters() {
        assert_eq!(
            LdapResolver::escape_filter_value("ad*min)(uid=*"),
            "ad\\2amin\\29\\28uid=\\2a"
        );
    }
}
