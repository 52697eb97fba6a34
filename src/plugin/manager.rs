use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::Plugin;
use crate::error::{Error, Result};

/// A live plugin instance shared between the pool and its dependants.
pub type Handle<T> = Arc<RwLock<Box<T>>>;

/// Builds an empty instance for the given id.
pub type Factory<T> = Arc<dyn Fn(&str) -> Box<T> + Send + Sync>;

/// Raw plugin configuration: `{id: {plugin_name: fields}}`.
pub type PluginConfigs = BTreeMap<String, BTreeMap<String, serde_yaml::Value>>;

struct Pool<T: ?Sized> {
    factories: BTreeMap<String, Factory<T>>,
    plugins: BTreeMap<String, Handle<T>>,
    errors: Vec<Error>,
}

impl<T: ?Sized> Pool<T> {
    fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
            plugins: BTreeMap::new(),
            errors: Vec::new(),
        }
    }
}

/// Registry of named factories plus the id-keyed pool of live instances for
/// one plugin family.
pub struct Manager<T: ?Sized> {
    family: &'static str,
    pool: RwLock<Pool<T>>,
}

impl<T: ?Sized> Manager<T> {
    pub fn new(family: &'static str) -> Self {
        Self {
            family,
            pool: RwLock::new(Pool::empty()),
        }
    }

    pub fn family(&self) -> &'static str {
        self.family
    }

    /// Register a factory under a plugin-type name.
    ///
    /// Fails with [`Error::AlreadyRegistered`] if the name is taken; the
    /// original factory stays bound.
    pub fn register_factory<F>(&self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&str) -> Box<T> + Send + Sync + 'static,
    {
        let mut pool = self.pool.write();
        if pool.factories.contains_key(name) {
            return Err(Error::AlreadyRegistered(name.to_string()));
        }
        tracing::debug!(family = self.family, plugin = name, "registering plugin factory");
        pool.factories.insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    /// Return the instance for `id`, building it with the `name` factory on
    /// first access.
    pub fn get_plugin(&self, name: &str, id: &str) -> Result<Handle<T>> {
        if let Some(plugin) = self.pool.read().plugins.get(id) {
            return Ok(Arc::clone(plugin));
        }

        let mut pool = self.pool.write();
        // Another caller may have built it between the two locks.
        if let Some(plugin) = pool.plugins.get(id) {
            return Ok(Arc::clone(plugin));
        }
        let factory = pool
            .factories
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        tracing::debug!(family = self.family, plugin = name, id, "creating plugin instance");
        let plugin: Handle<T> = Arc::new(RwLock::new(factory(id)));
        pool.plugins.insert(id.to_string(), Arc::clone(&plugin));
        Ok(plugin)
    }

    /// Look up an existing instance without creating one.
    pub fn find_plugin(&self, id: &str) -> Option<Handle<T>> {
        self.pool.read().plugins.get(id).cloned()
    }

    pub fn has_factory(&self, name: &str) -> bool {
        self.pool.read().factories.contains_key(name)
    }

    /// Sorted list of registered plugin-type names.
    pub fn list_plugins(&self) -> Vec<String> {
        self.pool.read().factories.keys().cloned().collect()
    }

    /// Snapshot of the instance pool, ordered by id.
    pub fn get_plugins(&self) -> BTreeMap<String, Handle<T>> {
        self.pool.read().plugins.clone()
    }

    pub fn set_plugins(&self, plugins: BTreeMap<String, Handle<T>>) {
        self.pool.write().plugins = plugins;
    }

    pub fn remove_plugin(&self, id: &str) -> Option<Handle<T>> {
        self.pool.write().plugins.remove(id)
    }

    pub fn reset_plugins(&self) {
        self.pool.write().plugins.clear();
    }

    pub fn add_errors(&self, errs: impl IntoIterator<Item = Error>) {
        self.pool.write().errors.extend(errs);
    }

    pub fn errors(&self) -> Vec<Error> {
        self.pool.read().errors.clone()
    }

    pub fn reset_errors(&self) {
        self.pool.write().errors.clear();
    }

    /// Clear factories, instances and errors.
    pub fn reset(&self) {
        *self.pool.write() = Pool::empty();
    }
}

impl<T: Plugin + ?Sized> Manager<T> {
    /// Instantiate and configure every entry of a `{id: {plugin: fields}}`
    /// section, returning the number of entries parsed.
    ///
    /// Unknown plugin names are skipped. An entry whose fields fail to
    /// decode is recorded as an error and dropped from the pool; the rest
    /// of the section is still parsed.
    pub fn parse_config(&self, raw: &PluginConfigs) -> usize {
        tracing::debug!(
            family = self.family,
            registry = ?self.list_plugins(),
            "available plugins"
        );

        let mut count = 0;
        for (id, plugin_conf) in raw {
            for (plugin_name, fields) in plugin_conf {
                let handle = match self.get_plugin(plugin_name, id) {
                    Ok(handle) => handle,
                    Err(e) => {
                        tracing::debug!(
                            family = self.family,
                            id = %id,
                            error = %e,
                            "skipping unknown plugin"
                        );
                        continue;
                    }
                };

                let configured = handle.write().configure(fields.clone());
                if let Err(e) = configured {
                    tracing::error!(family = self.family, id = %id, error = %e, "failed to parse plugin");
                    self.remove_plugin(id);
                    self.add_errors([e]);
                    continue;
                }

                tracing::debug!(family = self.family, id = %id, plugin = %plugin_name, "parsed plugin");
                count += 1;
            }
        }

        tracing::info!(family = self.family, count, "parsed plugins");
        count
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;
    use serde::Deserialize;

    use super::*;
    use crate::plugin::{decode_into, PluginBase};

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Probe {
        #[serde(skip)]
        base: PluginBase,
        label: String,
        count: u32,
    }

    impl Probe {
        fn new(id: &str) -> Self {
            Self {
                base: PluginBase::new(id),
                ..Default::default()
            }
        }
    }

    impl Plugin for Probe {
        fn plugin_name(&self) -> &'static str {
            "probe"
        }

        fn plugin_base(&self) -> &PluginBase {
            &self.base
        }

        fn plugin_base_mut(&mut self) -> &mut PluginBase {
            &mut self.base
        }

        fn configure(&mut self, raw: serde_yaml::Value) -> Result<()> {
            decode_into(self, "probe", raw)
        }
    }

    fn manager() -> Manager<dyn Plugin> {
        let m: Manager<dyn Plugin> = Manager::new("test");
        m.register_factory("probe", |id| Box::new(Probe::new(id)))
            .unwrap();
        m
    }

    #[test]
    fn duplicate_registration_keeps_original_factory() {
        let m: Manager<dyn Plugin> = Manager::new("test");
        m.register_factory("probe", |id| Box::new(Probe::new(id)))
            .unwrap();
        let err = m
            .register_factory("probe", |id| {
                let mut p = Probe::new(id);
                p.label = "second".into();
                Box::new(p)
            })
            .unwrap_err();
        assert_eq!(err, Error::AlreadyRegistered("probe".into()));

        let plugin = m.get_plugin("probe", "p1").unwrap();
        let guard = plugin.read();
        assert_eq!(guard.id(), "p1");
        assert!(!format!("{:?}", guard).contains("second"));
    }

    #[test]
    fn same_id_returns_same_instance() {
        let m = manager();
        let a = m.get_plugin("probe", "p1").unwrap();
        let b = m.get_plugin("probe", "p1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = m.get_plugin("probe", "p2").unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn unknown_factory_is_not_found() {
        let m = manager();
        let err = m.get_plugin("missing", "p1").unwrap_err();
        assert_eq!(err, Error::NotFound("missing".into()));
        assert!(m.find_plugin("p1").is_none());
    }

    #[test]
    fn concurrent_first_access_builds_once() {
        let built = Arc::new(AtomicUsize::new(0));
        let m: Manager<dyn Plugin> = Manager::new("test");
        let counter = Arc::clone(&built);
        m.register_factory("probe", move |id| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(Probe::new(id))
        })
        .unwrap();

        let handles: Vec<Handle<dyn Plugin>> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..8)
                .map(|_| s.spawn(|| m.get_plugin("probe", "shared").unwrap()))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn concurrent_registration_accepts_each_name_once() {
        let m: Manager<dyn Plugin> = Manager::new("test");
        let outcomes: Vec<bool> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..8)
                .map(|i| {
                    let m = &m;
                    s.spawn(move || {
                        m.register_factory(&format!("probe-{}", i % 4), |id| {
                            Box::new(Probe::new(id))
                        })
                        .is_ok()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 4);
        assert_eq!(m.list_plugins().len(), 4);
    }

    #[test]
    fn reset_clears_factories_instances_and_errors() {
        let m = manager();
        m.get_plugin("probe", "p1").unwrap();
        m.add_errors([Error::Config("boom".into())]);
        m.reset();
        assert!(m.list_plugins().is_empty());
        assert!(m.get_plugins().is_empty());
        assert!(m.errors().is_empty());
    }

    #[test]
    fn parse_config_skips_unknown_and_isolates_decode_failures() {
        let m = manager();
        let raw: PluginConfigs = serde_yaml::from_str(
            r#"
good:
  probe:
    label: hello
    count: 3
bad:
  probe:
    count: not-a-number
elsewhere:
  unknown-plugin:
    anything: true
"#,
        )
        .unwrap();

        let parsed = m.parse_config(&raw);
        assert_eq!(parsed, 1);
        assert!(m.find_plugin("good").is_some());
        assert!(m.find_plugin("bad").is_none());
        assert!(m.find_plugin("elsewhere").is_none());

        let errors = m.errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], Error::Decode { id, .. } if id == "bad"));

        let good = m.find_plugin("good").unwrap();
        assert_eq!(good.read().id(), "good");
    }

    proptest! {
        #[test]
        fn list_plugins_is_sorted_and_deduplicated(names in proptest::collection::vec("[a-z:]{1,8}", 0..12)) {
            let m: Manager<dyn Plugin> = Manager::new("test");
            for name in &names {
                let _ = m.register_factory(name, |id| Box::new(Probe::new(id)));
            }
            let listed = m.list_plugins();
            let mut expected = names.clone();
            expected.sort();
            expected.dedup();
            prop_assert_eq!(listed, expected);
        }
    }
}
