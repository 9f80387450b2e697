//! Field definition and parameter-source variants

use crate::error::{FieldError, IndexerRejection};
use meshfield_types::{MeshId, Value, ValueStore, ValueType};
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to a field definition.
///
/// Fields are shared between their owners, indexer references and
/// evaluation caches within a single thread.
pub type FieldHandle = Rc<RefCell<Field>>;

/// Coordinate system a field's values are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSystem {
    RectangularCartesian,
    CylindricalPolar,
    SphericalPolar,
    Fibre,
    NotApplicable,
}

/// Which of the three parameter-source variants a field uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// One value per component, stored in the field
    Constant,
    /// `components x index_count` values selected by another field's integer value
    Indexed,
    /// Per-element parameters stored externally with the mesh
    General,
}

#[derive(Debug, Clone, Default)]
struct Component {
    name: Option<String>,
}

enum ParameterSource {
    Constant {
        values: ValueStore,
    },
    Indexed {
        indexer: FieldHandle,
        index_count: usize,
        values: ValueStore,
    },
    General,
}

/// A named, typed quantity defined over a region
pub struct Field {
    name: String,
    region: String,
    components: Vec<Component>,
    value_type: ValueType,
    coordinate_system: CoordinateSystem,
    source: ParameterSource,
    host_mesh: Option<MeshId>,
    change_count: u64,
}

impl Field {
    /// Create a field with no components, real values and general
    /// (per-element) parameters.
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Field {
            name: name.into(),
            region: region.into(),
            components: Vec::new(),
            value_type: ValueType::Real,
            coordinate_system: CoordinateSystem::NotApplicable,
            source: ParameterSource::General,
            host_mesh: None,
            change_count: 0,
        }
    }

    /// Create a field wrapped in a shared handle
    pub fn new_handle(name: impl Into<String>, region: impl Into<String>) -> FieldHandle {
        Rc::new(RefCell::new(Field::new(name, region)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn coordinate_system(&self) -> CoordinateSystem {
        self.coordinate_system
    }

    pub fn set_coordinate_system(&mut self, coordinate_system: CoordinateSystem) {
        self.coordinate_system = coordinate_system;
        self.touch();
    }

    pub fn source_kind(&self) -> SourceKind {
        match self.source {
            ParameterSource::Constant { .. } => SourceKind::Constant,
            ParameterSource::Indexed { .. } => SourceKind::Indexed,
            ParameterSource::General => SourceKind::General,
        }
    }

    /// The indexer field, if this field is indexed
    pub fn indexer(&self) -> Option<FieldHandle> {
        match &self.source {
            ParameterSource::Indexed { indexer, .. } => Some(Rc::clone(indexer)),
            _ => None,
        }
    }

    /// Number of index values, if this field is indexed
    pub fn index_count(&self) -> Option<usize> {
        match &self.source {
            ParameterSource::Indexed { index_count, .. } => Some(*index_count),
            _ => None,
        }
    }

    pub fn host_mesh(&self) -> Option<MeshId> {
        self.host_mesh
    }

    /// Set the host mesh reference, required before storing mesh-location
    /// values. The reference is immutable once set; setting the same mesh
    /// again is a no-op.
    pub fn set_host_mesh(&mut self, mesh: MeshId) -> Result<(), FieldError> {
        match self.host_mesh {
            None => {
                self.host_mesh = Some(mesh);
                Ok(())
            }
            Some(current) if current == mesh => Ok(()),
            Some(_) => Err(FieldError::HostMeshAlreadySet {
                field: self.name.clone(),
            }),
        }
    }

    /// Monotonic stamp bumped by every mutation of the definition or its
    /// stored values. Evaluation caches compare stamps to detect staleness
    /// lazily instead of being notified.
    pub fn change_count(&self) -> u64 {
        self.change_count
    }

    fn touch(&mut self) {
        self.change_count += 1;
    }

    /// Number of values the current variant stores
    pub fn value_count(&self) -> usize {
        match &self.source {
            ParameterSource::Constant { values } => values.len(),
            ParameterSource::Indexed { values, .. } => values.len(),
            ParameterSource::General => 0,
        }
    }

    /// Read-only view of the variant's value store, `None` for general fields
    pub fn values(&self) -> Option<&ValueStore> {
        match &self.source {
            ParameterSource::Constant { values } => Some(values),
            ParameterSource::Indexed { values, .. } => Some(values),
            ParameterSource::General => None,
        }
    }

    fn check_value_type_component_count(
        &self,
        value_type: ValueType,
        count: usize,
    ) -> Result<(), FieldError> {
        let single_only = matches!(
            value_type,
            ValueType::String | ValueType::Url | ValueType::MeshLocation
        );
        if single_only && count > 1 {
            return Err(FieldError::MultiComponentUnsupported {
                field: self.name.clone(),
                value_type,
            });
        }
        Ok(())
    }

    /// Change the number of components.
    ///
    /// Parameter storage is resized per variant (`count` values for
    /// constant, `count x index_count` for indexed, none for general);
    /// values of surviving components are kept, new components start with
    /// default values and no custom name, surplus values and names are
    /// dropped.
    pub fn set_component_count(&mut self, count: usize) -> Result<(), FieldError> {
        self.check_value_type_component_count(self.value_type, count)?;
        match &mut self.source {
            ParameterSource::Constant { values } => values.resize(count),
            ParameterSource::Indexed {
                values,
                index_count,
                ..
            } => {
                // stride per component is unchanged, so surviving component
                // blocks keep their linear positions
                values.resize(count * *index_count);
            }
            ParameterSource::General => {}
        }
        self.components.resize_with(count, Component::default);
        self.touch();
        Ok(())
    }

    /// Change the value type, reallocating parameter storage only when the
    /// type actually changes. Stored values reset to defaults.
    pub fn set_value_type(&mut self, value_type: ValueType) -> Result<(), FieldError> {
        if value_type == self.value_type {
            return Ok(());
        }
        self.check_value_type_component_count(value_type, self.components.len())?;
        match &mut self.source {
            ParameterSource::Constant { values } => {
                *values = ValueStore::new(value_type, self.components.len());
            }
            ParameterSource::Indexed {
                values,
                index_count,
                ..
            } => {
                *values = ValueStore::new(value_type, self.components.len() * *index_count);
            }
            ParameterSource::General => {}
        }
        self.value_type = value_type;
        self.touch();
        Ok(())
    }

    /// Switch to the global-constant variant: one stored value per
    /// component, zero/null-initialized. The previous variant's storage is
    /// released.
    pub fn set_source_constant(&mut self) {
        self.source = ParameterSource::Constant {
            values: ValueStore::new(self.value_type, self.components.len()),
        };
        self.touch();
    }

    /// Switch to the general variant: parameters live externally with the
    /// mesh. The previous variant's storage is released.
    pub fn set_source_general(&mut self) {
        self.source = ParameterSource::General;
        self.touch();
    }

    /// Switch `field` to the indexed variant with `index_count` values per
    /// component, selected by the integer value of `indexer`.
    ///
    /// The indexer must be single-component, integer-valued, not itself
    /// indexed, and not `field` itself; cycles are impossible by
    /// construction. On rejection the field keeps its previous variant
    /// untouched.
    pub fn set_source_indexed(
        field: &FieldHandle,
        indexer: &FieldHandle,
        index_count: usize,
    ) -> Result<(), FieldError> {
        if Rc::ptr_eq(field, indexer) {
            return Err(FieldError::InvalidIndexer {
                field: field.borrow().name.clone(),
                reason: IndexerRejection::SelfReference,
            });
        }
        let mut this = field.borrow_mut();
        if index_count == 0 {
            return Err(FieldError::InvalidIndexCount {
                field: this.name.clone(),
            });
        }
        {
            let candidate = indexer.borrow();
            let rejection = if candidate.component_count() != 1 {
                Some(IndexerRejection::MultiComponent)
            } else if candidate.value_type() != ValueType::Int {
                Some(IndexerRejection::NonInteger)
            } else if candidate.source_kind() == SourceKind::Indexed {
                Some(IndexerRejection::Indexed)
            } else {
                None
            };
            if let Some(reason) = rejection {
                return Err(FieldError::InvalidIndexer {
                    field: this.name.clone(),
                    reason,
                });
            }
        }
        this.source = ParameterSource::Indexed {
            indexer: Rc::clone(indexer),
            index_count,
            values: ValueStore::new(this.value_type, this.components.len() * index_count),
        };
        this.touch();
        Ok(())
    }

    fn check_value_index(&self, index: usize) -> Result<(), FieldError> {
        let count = self.value_count();
        if index < count {
            Ok(())
        } else {
            Err(FieldError::IndexOutOfRange {
                field: self.name.clone(),
                index,
                count,
            })
        }
    }

    /// Get a stored value by linear index, bounds-checked against the
    /// variant's value count. General fields store no values.
    pub fn value(&self, index: usize) -> Result<&Value, FieldError> {
        self.check_value_index(index)?;
        let store = self.values().expect("checked variant stores values");
        Ok(store.get(index)?)
    }

    /// Store a value by linear index.
    ///
    /// Mesh-location values require the host mesh reference to be set
    /// first. On any failure the field is unchanged.
    pub fn set_value(&mut self, index: usize, value: Value) -> Result<(), FieldError> {
        self.check_value_index(index)?;
        if matches!(value, Value::MeshLocation(Some(_))) && self.host_mesh.is_none() {
            return Err(FieldError::HostMeshRequired {
                field: self.name.clone(),
            });
        }
        let store = match &mut self.source {
            ParameterSource::Constant { values } => values,
            ParameterSource::Indexed { values, .. } => values,
            ParameterSource::General => unreachable!("checked variant stores values"),
        };
        store.set(index, value)?;
        self.touch();
        Ok(())
    }

    pub fn real_value(&self, index: usize) -> Result<f64, FieldError> {
        self.check_value_index(index)?;
        let store = self.values().expect("checked variant stores values");
        Ok(store.get_real(index)?)
    }

    pub fn set_real_value(&mut self, index: usize, value: f64) -> Result<(), FieldError> {
        self.set_value(index, Value::Real(value))
    }

    pub fn int_value(&self, index: usize) -> Result<i32, FieldError> {
        self.check_value_index(index)?;
        let store = self.values().expect("checked variant stores values");
        Ok(store.get_int(index)?)
    }

    pub fn set_int_value(&mut self, index: usize, value: i32) -> Result<(), FieldError> {
        self.set_value(index, Value::Int(value))
    }

    pub fn string_value(&self, index: usize) -> Result<Option<&str>, FieldError> {
        self.check_value_index(index)?;
        let store = self.values().expect("checked variant stores values");
        Ok(store.get_string(index)?)
    }

    pub fn set_string_value(
        &mut self,
        index: usize,
        value: impl Into<String>,
    ) -> Result<(), FieldError> {
        let slot = match self.value_type {
            ValueType::Url => Value::Url(Some(value.into())),
            _ => Value::String(Some(value.into())),
        };
        self.set_value(index, slot)
    }

    /// Linear index of an indexed field's value for `(component,
    /// index_value)`, with `index_value` counted from 1.
    pub fn indexed_value_index(
        &self,
        component: usize,
        index_value: i32,
    ) -> Result<usize, FieldError> {
        if component >= self.components.len() {
            return Err(FieldError::InvalidComponent {
                field: self.name.clone(),
                component,
            });
        }
        let index_count = match &self.source {
            ParameterSource::Indexed { index_count, .. } => *index_count,
            _ => {
                return Err(FieldError::IndexOutOfRange {
                    field: self.name.clone(),
                    index: 0,
                    count: 0,
                })
            }
        };
        if index_value < 1 || index_value as usize > index_count {
            return Err(FieldError::IndexOutOfRange {
                field: self.name.clone(),
                index: index_value.max(0) as usize,
                count: index_count,
            });
        }
        Ok(component * index_count + (index_value as usize - 1))
    }

    /// Display name of a component: the custom name if one was set, else
    /// the 1-based component index.
    pub fn component_name(&self, component: usize) -> Result<String, FieldError> {
        if component >= self.components.len() {
            return Err(FieldError::InvalidComponent {
                field: self.name.clone(),
                component,
            });
        }
        Ok(match &self.components[component].name {
            Some(name) => name.clone(),
            None => (component + 1).to_string(),
        })
    }

    pub fn set_component_name(
        &mut self,
        component: usize,
        name: impl Into<String>,
    ) -> Result<(), FieldError> {
        if component >= self.components.len() {
            return Err(FieldError::InvalidComponent {
                field: self.name.clone(),
                component,
            });
        }
        self.components[component].name = Some(name.into());
        self.touch();
        Ok(())
    }
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("region", &self.region)
            .field("components", &self.components.len())
            .field("value_type", &self.value_type)
            .field("source", &self.source_kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_field(name: &str, components: usize) -> Field {
        let mut field = Field::new(name, "test");
        field.set_component_count(components).unwrap();
        field.set_source_constant();
        field
    }

    #[test]
    fn new_field_defaults() {
        let field = Field::new("coordinates", "test");
        assert_eq!(field.component_count(), 0);
        assert_eq!(field.value_type(), ValueType::Real);
        assert_eq!(field.source_kind(), SourceKind::General);
        assert_eq!(field.value_count(), 0);
    }

    #[test]
    fn component_names_default_to_one_based_index() {
        let mut field = constant_field("coordinates", 3);
        assert_eq!(field.component_name(0).unwrap(), "1");
        assert_eq!(field.component_name(2).unwrap(), "3");
        field.set_component_name(0, "x").unwrap();
        assert_eq!(field.component_name(0).unwrap(), "x");
        assert_eq!(field.component_name(1).unwrap(), "2");
        assert!(field.component_name(3).is_err());
    }

    #[test]
    fn constant_storage_tracks_component_count() {
        let mut field = constant_field("pressure", 2);
        field.set_real_value(0, 1.5).unwrap();
        field.set_real_value(1, 2.5).unwrap();

        field.set_component_count(4).unwrap();
        assert_eq!(field.value_count(), 4);
        // surviving values kept, new ones zero
        assert_eq!(field.real_value(0).unwrap(), 1.5);
        assert_eq!(field.real_value(3).unwrap(), 0.0);

        field.set_component_count(1).unwrap();
        assert_eq!(field.value_count(), 1);
        assert_eq!(field.real_value(0).unwrap(), 1.5);
    }

    #[test]
    fn set_value_type_reallocates_only_on_change() {
        let mut field = constant_field("label", 1);
        field.set_real_value(0, 4.0).unwrap();
        let stamp = field.change_count();

        // same type: no-op, no reallocation, no change
        field.set_value_type(ValueType::Real).unwrap();
        assert_eq!(field.change_count(), stamp);
        assert_eq!(field.real_value(0).unwrap(), 4.0);

        field.set_value_type(ValueType::Int).unwrap();
        assert!(field.change_count() > stamp);
        assert_eq!(field.int_value(0).unwrap(), 0);
    }

    #[test]
    fn multi_component_string_rejected() {
        let mut field = constant_field("names", 2);
        let err = field.set_value_type(ValueType::String).unwrap_err();
        assert!(matches!(
            err,
            FieldError::MultiComponentUnsupported { .. }
        ));
        // field unchanged after the failed call
        assert_eq!(field.value_type(), ValueType::Real);
        assert_eq!(field.component_count(), 2);

        let mut single = constant_field("name", 1);
        single.set_value_type(ValueType::String).unwrap();
        let err = single.set_component_count(3).unwrap_err();
        assert!(matches!(
            err,
            FieldError::MultiComponentUnsupported { .. }
        ));
        assert_eq!(single.component_count(), 1);
    }

    #[test]
    fn indexer_shape_is_validated() {
        let field = Rc::new(RefCell::new(constant_field("material", 1)));
        field.borrow_mut().set_value_type(ValueType::Int).unwrap();

        // multi-component indexer rejected
        let wide = Rc::new(RefCell::new(constant_field("wide", 2)));
        wide.borrow_mut().set_value_type(ValueType::Int).unwrap();
        let err = Field::set_source_indexed(&field, &wide, 4).unwrap_err();
        assert!(matches!(
            err,
            FieldError::InvalidIndexer {
                reason: IndexerRejection::MultiComponent,
                ..
            }
        ));

        // non-integer indexer rejected
        let real = Rc::new(RefCell::new(constant_field("real", 1)));
        let err = Field::set_source_indexed(&field, &real, 4).unwrap_err();
        assert!(matches!(
            err,
            FieldError::InvalidIndexer {
                reason: IndexerRejection::NonInteger,
                ..
            }
        ));

        // self-reference rejected
        let err = Field::set_source_indexed(&field, &field, 4).unwrap_err();
        assert!(matches!(
            err,
            FieldError::InvalidIndexer {
                reason: IndexerRejection::SelfReference,
                ..
            }
        ));

        // the failed transitions left the variant untouched
        assert_eq!(field.borrow().source_kind(), SourceKind::Constant);

        // a single-component integer non-indexed field is accepted
        let index = Rc::new(RefCell::new(constant_field("index", 1)));
        index.borrow_mut().set_value_type(ValueType::Int).unwrap();
        Field::set_source_indexed(&field, &index, 4).unwrap();
        assert_eq!(field.borrow().source_kind(), SourceKind::Indexed);
        assert_eq!(field.borrow().value_count(), 4);

        // an indexed field is rejected as an indexer for another field
        let other = Rc::new(RefCell::new(constant_field("other", 1)));
        let err = Field::set_source_indexed(&other, &field, 2).unwrap_err();
        assert!(matches!(
            err,
            FieldError::InvalidIndexer {
                reason: IndexerRejection::Indexed,
                ..
            }
        ));
    }

    #[test]
    fn indexed_value_addressing_is_one_based() {
        let field = Rc::new(RefCell::new(constant_field("material", 2)));
        let index = Rc::new(RefCell::new(constant_field("index", 1)));
        index.borrow_mut().set_value_type(ValueType::Int).unwrap();
        Field::set_source_indexed(&field, &index, 3).unwrap();

        let f = field.borrow();
        assert_eq!(f.indexed_value_index(0, 1).unwrap(), 0);
        assert_eq!(f.indexed_value_index(1, 3).unwrap(), 5);
        assert!(f.indexed_value_index(0, 0).is_err());
        assert!(f.indexed_value_index(0, 4).is_err());
        assert!(f.indexed_value_index(2, 1).is_err());
    }

    #[test]
    fn mesh_location_values_require_host_mesh() {
        use meshfield_types::{ElementId, MeshLocation};

        let mut field = Field::new("location", "test");
        field.set_component_count(1).unwrap();
        field.set_value_type(ValueType::MeshLocation).unwrap();
        field.set_source_constant();

        let loc = MeshLocation::new(ElementId::new(3), &[0.5]).unwrap();
        let err = field
            .set_value(0, Value::MeshLocation(Some(loc.clone())))
            .unwrap_err();
        assert!(matches!(err, FieldError::HostMeshRequired { .. }));

        field.set_host_mesh(MeshId::new(1)).unwrap();
        field.set_value(0, Value::MeshLocation(Some(loc))).unwrap();

        // host mesh is immutable once set
        assert!(field.set_host_mesh(MeshId::new(1)).is_ok());
        let err = field.set_host_mesh(MeshId::new(2)).unwrap_err();
        assert!(matches!(err, FieldError::HostMeshAlreadySet { .. }));
    }

    #[test]
    fn variant_transitions_release_previous_storage() {
        let mut field = constant_field("pressure", 2);
        field.set_real_value(0, 3.0).unwrap();

        field.set_source_general();
        assert_eq!(field.value_count(), 0);
        assert!(field.values().is_none());

        field.set_source_constant();
        assert_eq!(field.value_count(), 2);
        // fresh zero-initialized storage, not the old values
        assert_eq!(field.real_value(0).unwrap(), 0.0);
    }

    #[test]
    fn mutations_bump_change_count() {
        let mut field = constant_field("pressure", 1);
        let mut stamp = field.change_count();
        for step in 0..3 {
            match step {
                0 => field.set_real_value(0, 1.0).unwrap(),
                1 => field.set_component_name(0, "p").unwrap(),
                _ => field.set_source_general(),
            }
            assert!(field.change_count() > stamp);
            stamp = field.change_count();
        }
    }
}
