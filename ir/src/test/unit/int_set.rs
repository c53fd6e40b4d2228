use std::collections::HashMap;

use crate::arith::{Analyzer, IntSet, eval_set};
use crate::buffer::Range;
use crate::expr::{PrimExpr, Var, floordiv};

#[test]
fn test_eval_set_relaxes_inner_var() {
    let (vo, vi) = (Var::index("vi_o"), Var::index("vi_i"));
    let analyzer = Analyzer::new();
    let dom = HashMap::from([(vi.clone(), IntSet::from_range(&Range::from_extent(16)))]);

    let set = eval_set(&(&vo * 16 + &vi), &dom, &analyzer);
    assert_eq!(set.min, Some(&vo * 16));
    assert_eq!(set.max, Some(&vo * 16 + 15));
}

#[test]
fn test_eval_set_untouched_expr_is_point() {
    let (a, b) = (Var::index("a"), Var::index("b"));
    let dom = HashMap::from([(b.clone(), IntSet::from_range(&Range::from_extent(4)))]);
    let set = eval_set(&a.to_expr(), &dom, &Analyzer::new());
    assert!(set.is_single_point());
}

#[test]
fn test_eval_set_floordiv() {
    let i = Var::index("i");
    let dom = HashMap::from([(i.clone(), IntSet::from_range(&Range::from_extent(32)))]);
    let set = eval_set(&floordiv(i.to_expr(), 8), &dom, &Analyzer::new());
    assert_eq!(set, IntSet::interval(PrimExpr::int(0), PrimExpr::int(3)));
}

#[test]
fn test_cover_range_keeps_inner_interval() {
    let vo = Var::index("vi_o");
    let mut analyzer = Analyzer::new();
    analyzer.bind(&vo, &Range::from_extent(4));
    let set = IntSet::interval(&vo * 16, &vo * 16 + 15);

    let range = set.cover_range(&Range::from_extent(64), &analyzer);
    assert_eq!(range, Range::from_min_extent(&vo * 16, 16));
}

#[test]
fn test_cover_range_clips_to_shape() {
    let analyzer = Analyzer::new();
    let set = IntSet::interval(PrimExpr::int(-2), PrimExpr::int(9));
    let range = set.cover_range(&Range::from_extent(8), &analyzer);
    assert_eq!(range, Range::from_min_extent(0, 8));

    let unbounded = IntSet::everything().cover_range(&Range::from_extent(8), &analyzer);
    assert_eq!(unbounded, Range::from_min_extent(0, 8));
}

#[test]
fn test_union() {
    let analyzer = Analyzer::new();
    let sets = [
        IntSet::interval(PrimExpr::int(0), PrimExpr::int(3)),
        IntSet::interval(PrimExpr::int(2), PrimExpr::int(9)),
    ];
    assert_eq!(IntSet::union(&sets, &analyzer), IntSet::interval(PrimExpr::int(0), PrimExpr::int(9)));

    let with_unbounded = [IntSet::interval(PrimExpr::int(0), PrimExpr::int(3)), IntSet::everything()];
    assert_eq!(IntSet::union(&with_unbounded, &analyzer), IntSet::everything());
}
