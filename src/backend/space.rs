use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{
    backend::ClassDefiner,
    classfile::{attributes::DecodeOptions, flags::AccessFlags, ClassFile},
    signatures::ClassName,
    sites::{ArtifactId, ClassSite, Materializer},
    Error::LoadFailure,
    Result,
};

/// How a definer treats a class that is defined again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefineMode {
    /// Replace the existing definition; the handle keeps its id and its generation increments
    InPlace,
    /// Always create a fresh, distinctly named class
    NewClass,
}

/// A defined class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassHandle {
    name: ClassName,
    generation: u32,
    id: u64,
}

impl ClassHandle {
    /// Name the class was defined under.
    #[must_use]
    pub fn name(&self) -> &ClassName {
        &self.name
    }

    /// Number of in-place redefinitions, 0 for the first definition.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Identity of the defined class, stable across in-place redefinition.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for ClassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.name, self.id, self.generation)
    }
}

struct Definition {
    handle: ClassHandle,
    image: Arc<[u8]>,
    site: ClassSite,
}

/// In-memory class definer.
///
/// Images are decoded and checked before they are accepted: a class whose bytes do not decode,
/// whose members carry invalid names or descriptors, or whose concrete methods lack code is a
/// [`crate::Error::LoadFailure`]. Accepted definitions are kept by class name.
pub struct ClassSpace {
    mode: DefineMode,
    options: DecodeOptions,
    classes: DashMap<ClassName, Definition>,
    next_id: AtomicU64,
}

impl ClassSpace {
    /// An empty space defining classes in `mode`.
    #[must_use]
    pub fn new(mode: DefineMode) -> Self {
        ClassSpace {
            mode,
            options: DecodeOptions::default(),
            classes: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Current handle of class `name`.
    #[must_use]
    pub fn get(&self, name: &ClassName) -> Option<ClassHandle> {
        self.classes.get(name).map(|d| d.handle.clone())
    }

    /// Current image of class `name`.
    #[must_use]
    pub fn image(&self, name: &ClassName) -> Option<Arc<[u8]>> {
        self.classes.get(name).map(|d| d.image.clone())
    }

    /// Site of the current definition of class `name`.
    #[must_use]
    pub fn site(&self, name: &ClassName) -> Option<ClassSite> {
        self.classes.get(name).map(|d| d.site.clone())
    }

    /// Number of defined classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if nothing has been defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    fn check(&self, bytes: &[u8]) -> Result<ClassFile> {
        let class = ClassFile::from_mem_with(bytes, &self.options)
            .map_err(|e| LoadFailure(format!("rejected image: {e}")))?;
        for method in &class.methods {
            let bodiless = method
                .access
                .intersects(AccessFlags::ABSTRACT | AccessFlags::NATIVE);
            if bodiless == method.code().is_some() {
                let name = method.name(&class.constant_pool).unwrap_or("?");
                return Err(LoadFailure(format!(
                    "method {} of {} has {} code",
                    name,
                    class.name().map(|n| n.to_string()).unwrap_or_default(),
                    if bodiless { "unexpected" } else { "no" }
                )));
            }
        }
        Ok(class)
    }

    fn materialize(bytes: &[u8], class: ClassFile) -> Result<ClassSite> {
        ClassSite::from_class(ArtifactId::of(bytes), class)
            .map_err(|e| LoadFailure(format!("rejected image: {e}")))
    }

    fn define_in_place(&self, bytes: &[u8], existing: Option<&ClassHandle>) -> Result<ClassHandle> {
        let class = self.check(bytes)?;
        let name = class
            .name()
            .map_err(|e| LoadFailure(format!("rejected image: {e}")))?;
        let site = Self::materialize(bytes, class)?;

        match (self.classes.entry(name.clone()), existing) {
            (Entry::Vacant(slot), None) => {
                let handle = ClassHandle {
                    name,
                    generation: 0,
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                };
                slot.insert(Definition {
                    handle: handle.clone(),
                    image: bytes.into(),
                    site,
                });
                Ok(handle)
            }
            (Entry::Occupied(mut slot), Some(previous)) => {
                let current = slot.get().handle.clone();
                if current != *previous {
                    return Err(LoadFailure(format!(
                        "stale handle {previous}, {name} is now {current}"
                    )));
                }
                let handle = ClassHandle {
                    name,
                    generation: current.generation + 1,
                    id: current.id,
                };
                slot.insert(Definition {
                    handle: handle.clone(),
                    image: bytes.into(),
                    site,
                });
                Ok(handle)
            }
            (Entry::Occupied(_), None) => Err(LoadFailure(format!("{name} is already defined"))),
            (Entry::Vacant(_), Some(previous)) => Err(LoadFailure(format!(
                "cannot redefine {previous} as {name}"
            ))),
        }
    }

    fn define_new(&self, bytes: &[u8]) -> Result<ClassHandle> {
        let mut class = self.check(bytes)?;
        let original = class
            .name()
            .map_err(|e| LoadFailure(format!("rejected image: {e}")))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = ClassName::new(&format!("{}$Defined{}", original.internal(), id));
        class
            .constant_pool
            .set_class_name(class.this_class, name.internal())
            .map_err(|e| LoadFailure(format!("rejected image: {e}")))?;
        let image = class
            .to_bytes()
            .map_err(|e| LoadFailure(format!("cannot rename {original}: {e}")))?;
        let site = Self::materialize(&image, class)?;

        let handle = ClassHandle {
            name: name.clone(),
            generation: 0,
            id,
        };
        self.classes.insert(
            name,
            Definition {
                handle: handle.clone(),
                image: image.into(),
                site,
            },
        );
        Ok(handle)
    }
}

impl ClassDefiner for ClassSpace {
    fn mode(&self) -> DefineMode {
        self.mode
    }

    fn define(&self, bytes: &[u8], existing: Option<&ClassHandle>) -> Result<ClassHandle> {
        let handle = match self.mode {
            DefineMode::InPlace => self.define_in_place(bytes, existing)?,
            DefineMode::NewClass => self.define_new(bytes)?,
        };
        log::debug!("defined {}", handle);
        Ok(handle)
    }
}

impl Materializer for ClassSpace {
    type Class = ClassHandle;
    type Annotation = ();

    fn class(&self, site: &ClassSite) -> Option<ClassHandle> {
        self.get(site.class_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::MemberInfo,
        test::{sample_class, sample_class_bytes, SAMPLE},
    };

    #[test]
    fn in_place_redefinition_keeps_identity() -> Result<()> {
        let space = ClassSpace::new(DefineMode::InPlace);
        let bytes = sample_class_bytes();
        let first = space.define(&bytes, None)?;
        assert_eq!(first.generation(), 0);

        let second = space.define(&bytes, Some(&first))?;
        assert_eq!(second.id(), first.id());
        assert_eq!(second.generation(), 1);
        assert_eq!(space.len(), 1);

        assert!(matches!(space.define(&bytes, Some(&first)), Err(LoadFailure(_))));
        assert!(matches!(space.define(&bytes, None), Err(LoadFailure(_))));

        let site = ClassSite::from_bytes(&bytes)?;
        assert_eq!(site.materialize(&space), Some(second));
        Ok(())
    }

    #[test]
    fn new_class_mode_renames() -> Result<()> {
        let space = ClassSpace::new(DefineMode::NewClass);
        let bytes = sample_class_bytes();
        let first = space.define(&bytes, None)?;
        let second = space.define(&bytes, Some(&first))?;
        assert_ne!(first.name(), second.name());
        assert!(first.name().internal().starts_with(SAMPLE));

        let site = space.site(second.name()).unwrap();
        assert_eq!(site.class_name(), second.name());
        assert!(site.method("compute", "(I)I").is_some());
        Ok(())
    }

    #[test]
    fn bad_images_fail_to_load() {
        let space = ClassSpace::new(DefineMode::InPlace);
        assert!(matches!(space.define(b"not a class", None), Err(LoadFailure(_))));

        let mut class = sample_class();
        let pool = &mut class.constant_pool;
        let abstract_method = MemberInfo::new(pool, AccessFlags::PUBLIC, "missing", "()V");
        class.methods.push(abstract_method);
        let bytes = class.to_bytes().unwrap();
        assert!(matches!(space.define(&bytes, None), Err(LoadFailure(_))));
        assert!(space.is_empty());
    }
}
