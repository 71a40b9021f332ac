// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::certificate::Certificate;
use crate::codec::{read_certificate_file, Codec};
use crate::name::Name;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Source {
    Static,
    File(PathBuf),
    Dir(PathBuf),
}

#[derive(Clone, Debug)]
struct AnchorGroup {
    id: String,
    source: Source,
    refresh: Option<Duration>,
    next_refresh: u64,
    names: BTreeSet<Name>,
}

/// Trust anchors organised in groups.
///
/// Static groups hold anchors added directly. Dynamic groups mirror a file or
/// a directory of base64 encoded certificates and, when given a refresh
/// period, reload it on lookup once the period has elapsed.
#[derive(Clone, Debug, Default)]
pub struct TrustAnchorContainer {
    groups: Vec<AnchorGroup>,
    anchors: BTreeMap<Name, Certificate>,
}

impl TrustAnchorContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `certificate` to the static group `group_id`.
    pub fn insert(&mut self, group_id: &str, certificate: Certificate) -> Result<()> {
        let index = match self.groups.iter().position(|g| g.id == group_id) {
            Some(i) if self.groups[i].source != Source::Static => {
                bail!("trust anchor group {:?} is not static", group_id)
            }
            Some(i) => i,
            None => {
                self.groups.push(AnchorGroup {
                    id: group_id.to_string(),
                    source: Source::Static,
                    refresh: None,
                    next_refresh: u64::MAX,
                    names: BTreeSet::new(),
                });
                self.groups.len() - 1
            }
        };

        debug!("adding trust anchor {} to group {:?}", certificate.name(), group_id);
        self.groups[index].names.insert(certificate.name().clone());
        self.anchors.insert(certificate.name().clone(), certificate);
        Ok(())
    }

    /// Creates a group backed by `path`, loading it immediately.
    ///
    /// A file group whose file cannot be loaded is an error; unreadable
    /// entries of a directory are skipped.
    pub fn insert_dynamic(
        &mut self,
        group_id: &str,
        path: &Path,
        is_dir: bool,
        refresh: Option<Duration>,
        codec: &dyn Codec,
        now: u64,
    ) -> Result<()> {
        if self.groups.iter().any(|g| g.id == group_id) {
            bail!("trust anchor group {:?} already exists", group_id);
        }

        let source = if is_dir {
            Source::Dir(path.to_path_buf())
        } else {
            read_certificate_file(codec, path)
                .with_context(|| format!("failed to load trust anchor {}", path.display()))?;
            Source::File(path.to_path_buf())
        };

        self.groups.push(AnchorGroup {
            id: group_id.to_string(),
            source,
            refresh,
            next_refresh: 0,
            names: BTreeSet::new(),
        });
        self.reload(self.groups.len() - 1, codec, now);
        Ok(())
    }

    /// Reloads every dynamic group whose refresh time has passed.
    pub fn refresh(&mut self, codec: &dyn Codec, now: u64) {
        for index in 0..self.groups.len() {
            let group = &self.groups[index];
            if group.refresh.is_some() && now >= group.next_refresh {
                self.reload(index, codec, now);
            }
        }
    }

    /// Replaces the anchors of one dynamic group with what its source holds now.
    ///
    /// An anchor the group no longer provides stays trusted while another
    /// group still holds it.
    fn reload(&mut self, index: usize, codec: &dyn Codec, now: u64) {
        let group = &self.groups[index];
        let loaded = match &group.source {
            Source::Static => return,
            Source::File(path) => match read_certificate_file(codec, path) {
                Ok(cert) => vec![cert],
                Err(e) => {
                    warn!("trust anchor group {:?}: {:#}", group.id, e);
                    Vec::new()
                }
            },
            Source::Dir(path) => load_dir(path, codec),
        };

        let previous = std::mem::take(&mut self.groups[index].names);
        for name in previous {
            if !self.groups.iter().any(|g| g.names.contains(&name)) {
                self.anchors.remove(&name);
            }
        }

        let group = &mut self.groups[index];
        for cert in loaded {
            group.names.insert(cert.name().clone());
            self.anchors.insert(cert.name().clone(), cert);
        }

        if let Some(period) = group.refresh {
            let period = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
            group.next_refresh = now.saturating_add(period);
        }
        info!(
            "loaded {} trust anchor(s) for group {:?}",
            group.names.len(),
            group.id
        );
    }

    /// First anchor whose name starts with `prefix`, after refreshing.
    pub fn find(&mut self, prefix: &Name, codec: &dyn Codec, now: u64) -> Option<Certificate> {
        self.refresh(codec, now);
        self.anchors
            .range(prefix.clone()..)
            .next()
            .filter(|(name, _)| prefix.is_prefix_of(name))
            .map(|(_, cert)| cert.clone())
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.anchors.clear();
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

fn load_dir(path: &Path, codec: &dyn Codec) -> Vec<Certificate> {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("cannot read trust anchor directory {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    files
        .iter()
        .filter_map(|file| match read_certificate_file(codec, file) {
            Ok(cert) => Some(cert),
            Err(e) => {
                debug!("skipping {}: {:#}", file.display(), e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Data;
    use crate::store::cache::tests::cert;
    use base64::{engine::general_purpose, Engine as _};

    struct JsonCodec;

    impl Codec for JsonCodec {
        fn decode_data(&self, wire: &[u8]) -> Result<Data> {
            Ok(serde_json::from_slice(wire)?)
        }
    }

    fn write_cert(dir: &Path, file: &str, name: &str) {
        let data = cert(name, u64::MAX).into_data();
        let text = general_purpose::STANDARD.encode(serde_json::to_vec(&data).unwrap());
        std::fs::write(dir.join(file), text).unwrap();
    }

    fn n(s: &str) -> Name {
        s.parse().unwrap()
    }

    #[test]
    fn static_group() {
        let mut anchors = TrustAnchorContainer::new();
        anchors
            .insert("static", cert("/root/KEY/1/self/v1", u64::MAX))
            .unwrap();
        assert_eq!(anchors.len(), 1);
        assert!(anchors.find(&n("/root/KEY/1"), &JsonCodec, 0).is_some());
        assert!(anchors.find(&n("/other"), &JsonCodec, 0).is_none());
    }

    #[test]
    fn file_group_requires_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut anchors = TrustAnchorContainer::new();
        let missing = dir.path().join("missing.cert");
        assert!(anchors
            .insert_dynamic("f", &missing, false, None, &JsonCodec, 0)
            .is_err());

        write_cert(dir.path(), "root.cert", "/root/KEY/1/self/v1");
        let file = dir.path().join("root.cert");
        anchors
            .insert_dynamic("f", &file, false, None, &JsonCodec, 0)
            .unwrap();
        assert!(anchors.find(&n("/root/KEY/1"), &JsonCodec, 0).is_some());
        assert!(anchors.insert("f", cert("/x/KEY/1/i/v", u64::MAX)).is_err());
        assert!(anchors
            .insert_dynamic("f", &file, false, None, &JsonCodec, 0)
            .is_err());
    }

    #[test]
    fn dir_group_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        write_cert(dir.path(), "a.cert", "/a/KEY/1/self/v1");
        std::fs::write(dir.path().join("junk.cert"), "not a certificate").unwrap();

        let mut anchors = TrustAnchorContainer::new();
        anchors
            .insert_dynamic(
                "d",
                dir.path(),
                true,
                Some(Duration::from_secs(1)),
                &JsonCodec,
                0,
            )
            .unwrap();
        assert_eq!(anchors.len(), 1);

        std::fs::remove_file(dir.path().join("a.cert")).unwrap();
        write_cert(dir.path(), "b.cert", "/b/KEY/1/self/v1");

        // Not yet due.
        assert!(anchors.find(&n("/a/KEY/1"), &JsonCodec, 999).is_some());
        assert!(anchors.find(&n("/b/KEY/1"), &JsonCodec, 999).is_none());

        assert!(anchors.find(&n("/a/KEY/1"), &JsonCodec, 1_000).is_none());
        assert!(anchors.find(&n("/b/KEY/1"), &JsonCodec, 1_000).is_some());
        assert_eq!(anchors.len(), 1);
    }

    #[test]
    fn refresh_keeps_anchors_held_by_another_group() {
        let dir = tempfile::tempdir().unwrap();
        write_cert(dir.path(), "root.cert", "/root/KEY/1/self/v1");

        let mut anchors = TrustAnchorContainer::new();
        anchors
            .insert("static", cert("/root/KEY/1/self/v1", u64::MAX))
            .unwrap();
        anchors
            .insert_dynamic(
                "d",
                dir.path(),
                true,
                Some(Duration::from_secs(1)),
                &JsonCodec,
                0,
            )
            .unwrap();

        std::fs::remove_file(dir.path().join("root.cert")).unwrap();
        assert!(anchors.find(&n("/root/KEY/1"), &JsonCodec, 1_000).is_some());
        assert_eq!(anchors.len(), 1);
    }

    #[test]
    fn without_refresh_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        write_cert(dir.path(), "a.cert", "/a/KEY/1/self/v1");

        let mut anchors = TrustAnchorContainer::new();
        anchors
            .insert_dynamic("d", dir.path(), true, None, &JsonCodec, 0)
            .unwrap();
        write_cert(dir.path(), "b.cert", "/b/KEY/1/self/v1");
        assert!(anchors.find(&n("/b/KEY/1"), &JsonCodec, u64::MAX).is_none());
        anchors.clear();
        assert!(anchors.is_empty());
    }
}
