//! Shared monomial basis and blending
//!
//! Every component an element field evaluation holds is either a legacy
//! grid (blended cell-by-cell at evaluate time) or a coefficient vector
//! over the shared tensor-product monomial basis defined here. External
//! basis families (Lagrange, simplex, ...) enter through
//! [`BasisFunctionSource`], which supplies the blending matrix from their
//! nodal parameters to monomial coefficients.
//!
//! Function ordering: the exponent of xi1 varies fastest, then xi2, then
//! xi3. Derivative output is organized in blocks of `function_count`
//! values: the value block first, then one block per xi direction, then
//! (at order two) one block per direction pair with the first direction
//! varying fastest.

use crate::error::EvalError;
use ndarray::Array2;

/// Tensor-product monomial basis with a polynomial order per xi direction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StandardBasis {
    orders: Vec<usize>,
}

impl StandardBasis {
    pub fn new(orders: Vec<usize>) -> Self {
        StandardBasis { orders }
    }

    /// The constant basis over a `dimension`-dimensional element
    pub fn constant(dimension: usize) -> Self {
        StandardBasis {
            orders: vec![0; dimension],
        }
    }

    pub fn orders(&self) -> &[usize] {
        &self.orders
    }

    pub fn dimension(&self) -> usize {
        self.orders.len()
    }

    /// Number of monomial functions, `prod(order_i + 1)`
    pub fn function_count(&self) -> usize {
        self.orders.iter().map(|o| o + 1).product()
    }

    /// Number of output blocks for a derivative order: `1 + n + ... + n^order`
    pub fn block_count(&self, derivative_order: usize) -> usize {
        let n = self.dimension();
        (0..=derivative_order).map(|d| n.pow(d as u32)).sum()
    }

    /// Evaluate every function's mixed partial derivative given the number
    /// of differentiations per xi direction. `counts` of all zeros gives
    /// plain values.
    pub fn evaluate_counts(&self, xi: &[f64], counts: &[usize]) -> Result<Vec<f64>, EvalError> {
        if xi.len() != self.orders.len() {
            return Err(EvalError::XiDimensionMismatch {
                expected: self.orders.len(),
                got: xi.len(),
            });
        }
        if counts.len() != self.orders.len() {
            return Err(EvalError::InvalidArgument(
                "derivative counts must match the basis dimension",
            ));
        }
        let tables: Vec<Vec<f64>> = (0..self.orders.len())
            .map(|i| monomial_1d(xi[i], self.orders[i], counts[i]))
            .collect();
        let count = self.function_count();
        let mut out = Vec::with_capacity(count);
        for f in 0..count {
            let mut index = f;
            let mut v = 1.0;
            for (i, order) in self.orders.iter().enumerate() {
                let e = index % (order + 1);
                index /= order + 1;
                v *= tables[i][e];
            }
            out.push(v);
        }
        Ok(out)
    }

    /// Evaluate values and all derivative blocks up to `derivative_order`.
    ///
    /// Output length is `block_count(order) * function_count`, laid out as
    /// documented in the module header.
    pub fn evaluate(&self, xi: &[f64], derivative_order: usize) -> Result<Vec<f64>, EvalError> {
        let n = self.dimension();
        let mut out = Vec::with_capacity(self.block_count(derivative_order) * self.function_count());
        let mut counts = vec![0usize; n];
        out.extend(self.evaluate_counts(xi, &counts)?);
        for d in 1..=derivative_order {
            let blocks = n.pow(d as u32);
            for b in 0..blocks {
                counts.iter_mut().for_each(|c| *c = 0);
                let mut rem = b;
                for _ in 0..d {
                    counts[rem % n] += 1;
                    rem /= n;
                }
                out.extend(self.evaluate_counts(xi, &counts)?);
            }
        }
        Ok(out)
    }
}

/// 1-D monomial table: the `deriv`-th derivative of `x^e` for `e` in
/// `0..=order`
fn monomial_1d(x: f64, order: usize, deriv: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(order + 1);
    for e in 0..=order {
        if e < deriv {
            out.push(0.0);
            continue;
        }
        // falling factorial e * (e-1) * ... * (e-deriv+1)
        let mut factor = 1.0;
        for k in 0..deriv {
            factor *= (e - k) as f64;
        }
        out.push(factor * x.powi((e - deriv) as i32));
    }
    out
}

/// Convert multilinear corner values to monomial coefficients in place.
///
/// `values` holds the corners of a cell with the first axis varying
/// fastest; its length must be a power of two. After the call the slice
/// holds the coefficients of the monomials with exponents in `{0,1}` per
/// axis, in the same ordering.
pub fn multilinear_to_monomial(values: &mut [f64]) {
    debug_assert!(values.len().is_power_of_two());
    let mut stride = 1;
    while stride < values.len() {
        let mut base = 0;
        while base < values.len() {
            for i in base..base + stride {
                values[i + stride] -= values[i];
            }
            base += stride * 2;
        }
        stride *= 2;
    }
}

/// Build the blending matrix that re-expresses monomial coefficients on an
/// ancestor element as coefficients on a descendant, through the affine
/// inheritance transform mapping `(1, childXi...)` to `ancestorXi`.
///
/// Returns the descendant basis and the matrix `P` with
/// `child_coefficients = P . ancestor_coefficients`. Computed once per
/// distinct basis during a calculation and reused across components.
pub fn projection_matrix(
    basis: &StandardBasis,
    transform: &Array2<f64>,
) -> Result<(StandardBasis, Array2<f64>), EvalError> {
    let ancestor_dim = basis.dimension();
    if transform.nrows() != ancestor_dim || transform.ncols() < 1 {
        return Err(EvalError::InvalidArgument(
            "inheritance transform does not match the basis dimension",
        ));
    }
    let child_dim = transform.ncols() - 1;

    // each child direction only accumulates order from the ancestor
    // directions whose affine row involves it
    let mut child_orders = vec![0usize; child_dim];
    for a in 0..ancestor_dim {
        for (c, order) in child_orders.iter_mut().enumerate() {
            if transform[[a, c + 1]] != 0.0 {
                *order += basis.orders()[a];
            }
        }
    }
    let child_basis = StandardBasis::new(child_orders);
    let child_count = child_basis.function_count();

    // affine forms of each ancestor xi as polynomials over the child basis
    let mut affine_forms = Vec::with_capacity(ancestor_dim);
    for a in 0..ancestor_dim {
        let mut poly = vec![0.0; child_count];
        poly[0] = transform[[a, 0]];
        // a direction of order zero never enters a product, and the child
        // basis reserves no slot for its linear terms
        if basis.orders()[a] > 0 {
            for c in 0..child_dim {
                let coefficient = transform[[a, c + 1]];
                if coefficient != 0.0 {
                    let mut exponents = vec![0usize; child_dim];
                    exponents[c] = 1;
                    poly[encode_exponents(&exponents, child_basis.orders())] += coefficient;
                }
            }
        }
        affine_forms.push(poly);
    }

    let ancestor_count = basis.function_count();
    let mut projection = Array2::zeros((child_count, ancestor_count));
    for fa in 0..ancestor_count {
        let mut poly = vec![0.0; child_count];
        poly[0] = 1.0;
        let mut index = fa;
        for a in 0..ancestor_dim {
            let e = index % (basis.orders()[a] + 1);
            index /= basis.orders()[a] + 1;
            for _ in 0..e {
                poly = poly_mul(&poly, &affine_forms[a], child_basis.orders());
            }
        }
        for (fc, v) in poly.iter().enumerate() {
            projection[[fc, fa]] = *v;
        }
    }
    Ok((child_basis, projection))
}

fn encode_exponents(exponents: &[usize], orders: &[usize]) -> usize {
    let mut index = 0;
    for (e, o) in exponents.iter().zip(orders).rev() {
        index = index * (o + 1) + e;
    }
    index
}

fn decode_exponents(mut index: usize, orders: &[usize]) -> Vec<usize> {
    orders
        .iter()
        .map(|o| {
            let e = index % (o + 1);
            index /= o + 1;
            e
        })
        .collect()
}

/// Multiply two polynomials expressed over the same monomial grid. The
/// grid's per-direction orders bound the product's degree by construction,
/// so no terms are lost.
fn poly_mul(a: &[f64], b: &[f64], orders: &[usize]) -> Vec<f64> {
    let mut out = vec![0.0; a.len()];
    for (ia, va) in a.iter().enumerate() {
        if *va == 0.0 {
            continue;
        }
        let ea = decode_exponents(ia, orders);
        for (ib, vb) in b.iter().enumerate() {
            if *vb == 0.0 {
                continue;
            }
            let eb = decode_exponents(ib, orders);
            let mut product = vec![0usize; ea.len()];
            let mut fits = true;
            for (i, (x, y)) in ea.iter().zip(&eb).enumerate() {
                product[i] = x + y;
                if product[i] > orders[i] {
                    fits = false;
                    break;
                }
            }
            debug_assert!(fits, "product degree exceeded the child basis orders");
            if fits {
                out[encode_exponents(&product, orders)] += va * vb;
            }
        }
    }
    out
}

/// Describes an external basis family whose blended monomial form has the
/// given per-xi orders
#[derive(Debug, Clone, PartialEq)]
pub struct BasisDescription {
    /// Provider's name for the basis, e.g. `"l.Lagrange*l.Lagrange"`
    pub name: String,
    /// Per-xi polynomial order of the blended monomial form
    pub monomial_orders: Vec<usize>,
}

/// External provider of basis blending matrices.
///
/// For a basis description, returns the matrix `B` with
/// `monomial_coefficients = B . parameters`, shaped
/// `(monomial function count, parameter count)`.
pub trait BasisFunctionSource {
    fn blending_matrix(&self, basis: &BasisDescription) -> Result<Array2<f64>, EvalError>;
}
