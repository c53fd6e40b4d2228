use std::collections::HashMap;

use proptest::prelude::*;
use tessera_ir::arith::{Analyzer, IntSet};
use tessera_ir::prelude::*;
use tessera_ir::{VarMap, substitute};

use crate::primitive::blockize::binding::{IterBindings, derive_block_binding};
use crate::primitive::blockize::divide::subspace_divide;
use crate::primitive::blockize::region::eval_set_regions;
use crate::test::helpers::*;

fn eval(expr: &PrimExpr, env: &VarMap) -> Option<i64> {
    Analyzer::new().simplify(&substitute(expr, env)).as_int()
}

fn point(assignment: &[(&Var, i64)]) -> VarMap {
    assignment.iter().map(|(var, value)| ((*var).clone(), PrimExpr::int(*value))).collect()
}

proptest! {
    #[test]
    fn divided_binding_recombines(tiles in 2i64..5, factor in 1i64..9, preserve in any::<bool>()) {
        let (i0, i1) = (Var::index("i0"), Var::index("i1"));
        let a = f32_buffer("A", &[tiles * factor]);
        let block = store_block("B", &a, &["v"]);
        let iter_var = block.iter_vars[0].clone();
        let binding = &i0 * factor + &i1;
        let body = loop_nest(&[(&i0, tiles), (&i1, factor)], realize(vec![binding.clone()], block));
        let state = state(PrimFunc::new("tiled", [a], body));
        let block = state.find_blocks("B")[0];
        let boundary = state.get_loops(block).unwrap()[1];

        let mut analyzer = Analyzer::new();
        let (division, _) = subspace_divide(&state, block, boundary, &mut analyzer, preserve, false).unwrap();
        let division = division.expect("tiled binding divides");
        let (outer_mark, inner_mark) = &division.marks[0];
        prop_assert_eq!(outer_mark.extent.as_int().zip(inner_mark.extent.as_int()).map(|(o, i)| o * i), Some(tiles * factor));

        let (mut outer, mut inner) = (IterBindings::default(), IterBindings::default());
        let subst =
            derive_block_binding(std::slice::from_ref(&iter_var), &division, &mut outer, &mut inner, preserve, false)
                .unwrap();

        for x0 in 0..tiles {
            for x1 in 0..factor {
                let env = point(&[(&i0, x0), (&i1, x1)]);
                let mut values = VarMap::new();
                let bound = outer.iter_vars.iter().zip(&outer.values).chain(inner.iter_vars.iter().zip(&inner.values));
                for (iv, value) in bound {
                    values.insert(iv.var.clone(), PrimExpr::int(eval(value, &env).unwrap()));
                }
                prop_assert_eq!(eval(&subst[&iter_var.var], &values), eval(&binding, &env));
            }
        }
    }

    #[test]
    fn relaxed_region_stays_in_buffer(size in 1i64..32, extent in 1i64..16, offset in -8i64..40) {
        let a = f32_buffer("A", &[size]);
        let v = Var::index("v");
        let mut analyzer = Analyzer::new();
        analyzer.bind(&v, &Range::from_extent(extent));
        let dom = HashMap::from([(v.clone(), IntSet::from_range(&Range::from_extent(extent)))]);

        let region = BufferRegion::from_point(&a, [&v + offset]);
        let relaxed = eval_set_regions(&[region], &dom, &analyzer).unwrap();
        let range = &relaxed[0].region[0];
        let (min, len) = (range.min.as_int().unwrap(), range.extent.as_int().unwrap());

        prop_assert!(min >= 0);
        prop_assert!(min + len <= size);
        let (lo, hi) = (offset.max(0), (offset + extent).min(size));
        if lo < hi {
            prop_assert_eq!((min, min + len), (lo, hi));
        }
    }
}
