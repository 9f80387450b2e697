//! Consumer façade
//!
//! [`FieldEvaluator`] bundles the collaborator handles (mesh topology,
//! element field data, node values, basis functions) with a bounded
//! evaluation cache per field, and exposes the calculate/evaluate surface
//! consumers drive. "Field not defined at this element" is reported as
//! `Ok(None)` everywhere; errors carry the failing field and element.

use crate::basis::BasisFunctionSource;
use crate::cache::{CacheConfig, FieldEvaluationCache};
use crate::error::EvalError;
use crate::evaluation::{EvalContext, MonomialInfo, Perturbations, RealEvaluation};
use crate::mesh::MeshTopology;
use crate::template::{FieldDataSource, NodeValueSource};
use meshfield_field::FieldHandle;
use meshfield_types::ElementId;
use std::rc::Rc;

/// Field evaluation entry point bundling collaborators and per-field
/// caches
pub struct FieldEvaluator<'a> {
    ctx: EvalContext<'a>,
    config: CacheConfig,
    caches: Vec<FieldEvaluationCache>,
    perturbations: Vec<(FieldHandle, Perturbations)>,
}

impl<'a> FieldEvaluator<'a> {
    pub fn new(
        mesh: &'a dyn MeshTopology,
        data: &'a dyn FieldDataSource,
        nodes: &'a dyn NodeValueSource,
        bases: &'a dyn BasisFunctionSource,
    ) -> Self {
        FieldEvaluator::with_config(mesh, data, nodes, bases, CacheConfig::default())
    }

    pub fn with_config(
        mesh: &'a dyn MeshTopology,
        data: &'a dyn FieldDataSource,
        nodes: &'a dyn NodeValueSource,
        bases: &'a dyn BasisFunctionSource,
        config: CacheConfig,
    ) -> Self {
        FieldEvaluator {
            ctx: EvalContext {
                mesh,
                data,
                nodes,
                bases,
            },
            config,
            caches: Vec::new(),
            perturbations: Vec::new(),
        }
    }

    fn cache_for(&mut self, field: &FieldHandle) -> &mut FieldEvaluationCache {
        if let Some(position) = self
            .caches
            .iter()
            .position(|cache| Rc::ptr_eq(cache.field(), field))
        {
            return &mut self.caches[position];
        }
        self.caches
            .push(FieldEvaluationCache::with_config(Rc::clone(field), self.config));
        self.caches.last_mut().expect("cache was just pushed")
    }

    /// Prepare the evaluation for `(field, element, time)`, resolving the
    /// definition through `top_level` when a specific ancestor is wanted.
    ///
    /// Returns whether the field is defined there. Later evaluate calls
    /// for the same `(element, time)` reuse the prepared object.
    pub fn calculate(
        &mut self,
        field: &FieldHandle,
        element: ElementId,
        time: f64,
        top_level: Option<ElementId>,
    ) -> Result<bool, EvalError> {
        let ctx = self.ctx;
        Ok(self
            .cache_for(field)
            .evaluation(element, time, top_level, &ctx)?
            .is_some())
    }

    /// Evaluate real values (and derivatives up to `derivative_order`) at
    /// `xi`; `None` when the field is not defined at the element
    pub fn evaluate_real(
        &mut self,
        field: &FieldHandle,
        component: Option<usize>,
        element: ElementId,
        xi: &[f64],
        time: f64,
        derivative_order: usize,
    ) -> Result<Option<RealEvaluation>, EvalError> {
        let ctx = self.ctx;
        let handle = match self.cache_for(field).evaluation(element, time, None, &ctx)? {
            Some(handle) => handle,
            None => return Ok(None),
        };
        let perturbations = self.perturbations_for(field);
        let result = handle
            .borrow()
            .evaluate_real(component, xi, derivative_order, perturbations)?;
        Ok(Some(result))
    }

    /// Evaluate integer values at `xi`; grid-mapped components use the
    /// nearest grid point
    pub fn evaluate_int(
        &mut self,
        field: &FieldHandle,
        component: Option<usize>,
        element: ElementId,
        xi: &[f64],
        time: f64,
    ) -> Result<Option<Vec<i32>>, EvalError> {
        let ctx = self.ctx;
        let handle = match self.cache_for(field).evaluation(element, time, None, &ctx)? {
            Some(handle) => handle,
            None => return Ok(None),
        };
        let result = handle.borrow().evaluate_int(component, xi)?;
        Ok(Some(result))
    }

    /// Evaluate a string-valued field; a stored null string comes back as
    /// the empty string
    pub fn evaluate_string(
        &mut self,
        field: &FieldHandle,
        component: usize,
        element: ElementId,
        xi: &[f64],
        time: f64,
    ) -> Result<Option<String>, EvalError> {
        let ctx = self.ctx;
        let handle = match self.cache_for(field).evaluation(element, time, None, &ctx)? {
            Some(handle) => handle,
            None => return Ok(None),
        };
        let result = handle.borrow().evaluate_string(component, xi)?;
        Ok(Some(result.unwrap_or_default()))
    }

    /// Evaluate any field as display text, components comma-separated
    pub fn evaluate_as_string(
        &mut self,
        field: &FieldHandle,
        component: Option<usize>,
        element: ElementId,
        xi: &[f64],
        time: f64,
    ) -> Result<Option<String>, EvalError> {
        let ctx = self.ctx;
        let handle = match self.cache_for(field).evaluation(element, time, None, &ctx)? {
            Some(handle) => handle,
            None => return Ok(None),
        };
        let result = handle.borrow().evaluate_as_string(component, xi)?;
        Ok(Some(result))
    }

    /// Copy of the gathered element parameters of one component
    pub fn component_values(
        &mut self,
        field: &FieldHandle,
        component: usize,
        element: ElementId,
        time: f64,
    ) -> Result<Option<Vec<f64>>, EvalError> {
        let ctx = self.ctx;
        let handle = match self.cache_for(field).evaluation(element, time, None, &ctx)? {
            Some(handle) => handle,
            None => return Ok(None),
        };
        let result = handle.borrow().component_values(component)?;
        Ok(Some(result))
    }

    /// Monomial shape of one component on one element
    pub fn monomial_component_info(
        &mut self,
        field: &FieldHandle,
        component: usize,
        element: ElementId,
        time: f64,
    ) -> Result<Option<MonomialInfo>, EvalError> {
        let ctx = self.ctx;
        let handle = match self.cache_for(field).evaluation(element, time, None, &ctx)? {
            Some(handle) => handle,
            None => return Ok(None),
        };
        let result = handle.borrow().monomial_component_info(component)?;
        Ok(Some(result))
    }

    /// Add a transient `delta x parameterBasisValue` offset to evaluations
    /// of one field component, for finite-difference derivatives of
    /// downstream consumers. Bounded per field; remove in reverse order.
    pub fn add_parameter_perturbation(
        &mut self,
        field: &FieldHandle,
        component: usize,
        parameter: usize,
        delta: f64,
    ) -> Result<(), EvalError> {
        let position = match self
            .perturbations
            .iter()
            .position(|(held, _)| Rc::ptr_eq(held, field))
        {
            Some(position) => position,
            None => {
                self.perturbations
                    .push((Rc::clone(field), Perturbations::new()));
                self.perturbations.len() - 1
            }
        };
        self.perturbations[position].1.push(component, parameter, delta)
    }

    /// Remove the most recently added perturbation of a field, which must
    /// match `(component, parameter)`
    pub fn remove_parameter_perturbation(
        &mut self,
        field: &FieldHandle,
        component: usize,
        parameter: usize,
    ) -> Result<(), EvalError> {
        let stack = self
            .perturbations
            .iter_mut()
            .find(|(held, _)| Rc::ptr_eq(held, field))
            .map(|(_, stack)| stack)
            .ok_or(EvalError::PerturbationOrder)?;
        stack.pop(component, parameter)
    }

    fn perturbations_for(&self, field: &FieldHandle) -> Option<&Perturbations> {
        self.perturbations
            .iter()
            .find(|(held, _)| Rc::ptr_eq(held, field))
            .map(|(_, stack)| stack)
            .filter(|stack| !stack.is_empty())
    }
}
