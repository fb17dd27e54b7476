//! Project loading shared by the commands

use anyhow::Context;
use skyflow_cloud::{
    Export, FileSecretStore, Graph, KeyPair, ResourceDeclaration, SecretBinding, SecretStore,
    SshKeygen, StateManager, ensure_key_pair, inject_secret,
};
use skyflow_core::{Topology, load_project, load_project_from_root};
use std::path::{Path, PathBuf};

/// A loaded project
pub struct Project {
    pub root: PathBuf,
    pub topology: Topology,
    keygen: SshKeygen,
}

impl Project {
    /// Load from `root`, or from the discovered project root
    pub fn load(root: Option<&Path>, ssh_keygen: String) -> anyhow::Result<Self> {
        let (root, topology) = match root {
            Some(root) => (root.to_path_buf(), load_project_from_root(root)?),
            None => load_project()?,
        };
        Ok(Self::from_parts(root, topology, ssh_keygen))
    }

    pub fn from_parts(root: PathBuf, topology: Topology, ssh_keygen: String) -> Self {
        Self {
            root,
            topology,
            keygen: SshKeygen::new(ssh_keygen),
        }
    }

    pub fn state_manager(&self) -> StateManager {
        StateManager::with_state_dir(&self.root, self.topology.settings.state_dir())
    }

    fn secret_store(&self, binding: &SecretBinding) -> FileSecretStore {
        FileSecretStore::new(self.root.join(&binding.path))
    }

    /// Key pairs of every binding, generated and stored on first use
    pub async fn ensure_key_pairs(&self) -> anyhow::Result<Vec<(SecretBinding, KeyPair)>> {
        let mut key_pairs = Vec::with_capacity(self.topology.secrets.len());
        for binding in &self.topology.secrets {
            let store = self.secret_store(binding);
            let key_pair = ensure_key_pair(&store, &self.keygen, binding.bits)
                .await
                .with_context(|| format!("keypair '{}'", binding.name))?;
            key_pairs.push((binding.clone(), key_pair));
        }
        Ok(key_pairs)
    }

    /// Key pairs already stored; bindings with nothing stored are returned separately
    pub async fn stored_key_pairs(
        &self,
    ) -> anyhow::Result<(Vec<(SecretBinding, KeyPair)>, Vec<SecretBinding>)> {
        let mut stored = Vec::new();
        let mut missing = Vec::new();
        for binding in &self.topology.secrets {
            let store = self.secret_store(binding);
            match store
                .load()
                .await
                .with_context(|| format!("keypair '{}'", binding.name))?
            {
                Some(key_pair) => stored.push((binding.clone(), key_pair)),
                None => missing.push(binding.clone()),
            }
        }
        Ok((stored, missing))
    }

    /// Declarations and exports with key material injected
    pub fn resolve(
        &self,
        key_pairs: &[(SecretBinding, KeyPair)],
    ) -> anyhow::Result<(Vec<ResourceDeclaration>, Vec<Export>)> {
        let mut declarations = self.topology.declarations.clone();
        let mut exports = self.topology.exports.clone();
        for (binding, key_pair) in key_pairs {
            inject_secret(&mut declarations, &mut exports, binding, key_pair)
                .with_context(|| format!("keypair '{}'", binding.name))?;
        }
        Ok((declarations, exports))
    }

    /// Build the resource graph and check that every export points into it
    pub fn build_graph(
        &self,
        declarations: Vec<ResourceDeclaration>,
        exports: &[Export],
    ) -> anyhow::Result<Graph> {
        let graph = Graph::build(declarations)?;
        for export in exports {
            graph.check_references(&export.name, export.reference())?;
        }
        Ok(graph)
    }
}
