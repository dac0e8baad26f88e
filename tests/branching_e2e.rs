use branchline::{
    Diff, EngineConfig, Entity, EntityId, EntityTypeRecord, Position, SchemaTable, StateRecord, StateVector,
    TimelineEngine, TimelineError, Universe,
};

struct Scenario {
    engine: TimelineEngine,
    entity: EntityId,
    bystander: EntityId,
    a: Position,
    b: Position,
    c: Position,
}

/// A -> B -> C chain with A recorded at 20 and C at 100 on the root
/// timeline, plus an unrelated entity of the same type.
fn scenario(seed: u64) -> Scenario {
    let schemas = SchemaTable::from_records(vec![EntityTypeRecord::new(
        "Chain",
        vec![
            StateRecord::new("A", "1 day").to("B"),
            StateRecord::new("B", "1 day").to("C"),
            StateRecord::new("C", ""),
        ],
    )])
    .unwrap();
    let ty = schemas.resolve("Chain").unwrap();
    let a = schemas.position(ty, "A").unwrap();
    let b = schemas.position(ty, "B").unwrap();
    let c = schemas.position(ty, "C").unwrap();

    let mut engine = TimelineEngine::new(schemas, EngineConfig::default().with_seed(seed)).unwrap();
    let entity = engine.register(&Entity::new(ty)).unwrap();
    let bystander = engine.register(&Entity::new(ty)).unwrap();

    let root = engine.root_universe();
    let mut timeline = engine.continuity(&root, entity).unwrap();
    assert!(timeline.assert(20, a).unwrap().is_accepted());
    assert!(timeline.assert(100, c).unwrap().is_accepted());

    Scenario {
        engine,
        entity,
        bystander,
        a,
        b,
        c,
    }
}

impl Scenario {
    fn diverge(&mut self, universe: &Universe, date: u64, position: Position) -> Diff {
        self.engine
            .continuity(universe, self.entity)
            .unwrap()
            .assert(date, position)
            .unwrap()
            .into_diff()
            .expect("assertion should diverge")
    }

    fn alternate(&mut self) -> (Diff, Universe) {
        let root = self.engine.root_universe();
        let a = self.a;
        let diff = self.diverge(&root, 99, a);
        let universe = self.engine.register_universe(&diff).unwrap();
        (diff, universe)
    }
}

#[test]
fn branch_records_the_catalyst_and_leaves_the_parent_alone() {
    let mut s = scenario(1);
    let (_, alternate) = s.alternate();
    let root = s.engine.root_universe();

    assert_eq!(
        s.engine.continuity(&alternate, s.entity).unwrap().measure_position(99).unwrap(),
        Some(s.a)
    );
    assert_eq!(
        s.engine.continuity(&root, s.entity).unwrap().measure_position(100).unwrap(),
        Some(s.c)
    );
    assert!(s
        .engine
        .continuity(&root, s.entity)
        .unwrap()
        .state_at_or_before(99)
        .unwrap()
        .try_as_definite_state()
        .is_some_and(|state| state == s.a.state()));

    // One tick after A the alternate cannot have reached C.
    let next = s.engine.continuity(&alternate, s.entity).unwrap().measure_position(100).unwrap();
    assert!(next == Some(s.a) || next == Some(s.b));
}

#[test]
fn history_before_the_branch_point_is_shared() {
    let mut s = scenario(2);
    let (_, alternate) = s.alternate();
    let root = s.engine.root_universe();

    let inherited = s.engine.continuity(&alternate, s.entity).unwrap().state_at_or_before(50).unwrap();
    assert_eq!(inherited, StateVector::from_definite_state(s.a.state(), 3));

    // A measurement before the branch point lands on the shared history.
    let measured = s.engine.continuity(&alternate, s.entity).unwrap().measure(60).unwrap();
    let seen_from_root = s.engine.continuity(&root, s.entity).unwrap().state_at_or_before(60).unwrap();
    assert_eq!(measured, seen_from_root);
}

#[test]
fn sibling_branches_constrain_shared_history() {
    let mut s = scenario(3);
    let root = s.engine.root_universe();

    let open = s.engine.continuity(&root, s.entity).unwrap().forecast(60).unwrap();
    assert!(open.probability(s.b.state()).is_some_and(|p| p > 0.0));

    let (_, alternate) = s.alternate();

    // Day 60 is shared with a timeline that is still A on day 99.
    let pinned = s.engine.continuity(&root, s.entity).unwrap().forecast(60).unwrap();
    assert_eq!(pinned.try_as_definite_state(), Some(s.a.state()));
    let through_branch = s.engine.continuity(&alternate, s.entity).unwrap().forecast(60).unwrap();
    assert_eq!(through_branch, pinned);
}

#[test]
fn registering_a_universe_is_idempotent() {
    let mut s = scenario(4);
    let (diff, alternate) = s.alternate();

    assert_eq!(s.engine.register_universe(&diff).unwrap(), alternate);
    assert_eq!(s.engine.timelines().len(), 2);
    assert_eq!(s.engine.universe(diff.id()), Some(alternate));
}

#[test]
fn the_same_divergence_yields_the_same_diff() {
    let mut s = scenario(5);
    let (diff, _) = s.alternate();
    let root = s.engine.root_universe();
    let a = s.a;

    let again = s.diverge(&root, 99, a);
    assert_eq!(again.id(), diff.id());
    assert_eq!(again, diff);
}

#[test]
fn unaffected_entities_share_the_parent_timeline() {
    let mut s = scenario(6);
    let (diff, alternate) = s.alternate();
    let root = s.engine.root_universe();

    assert!(!diff.is_affected(s.engine.objects(), s.bystander));
    assert!(diff.is_affected(s.engine.objects(), s.entity));

    let measured = s.engine.continuity(&alternate, s.bystander).unwrap().measure(500).unwrap();
    let seen_from_root = s.engine.continuity(&root, s.bystander).unwrap().state_at_or_before(500).unwrap();
    assert_eq!(measured, seen_from_root);
    assert!(!s.engine.timelines().branch(alternate.id()).unwrap().contains(s.bystander));
}

#[test]
fn branches_nest() {
    let mut s = scenario(7);
    let (_, alternate) = s.alternate();
    let (a, c) = (s.a, s.c);

    assert!(s
        .engine
        .continuity(&alternate, s.entity)
        .unwrap()
        .assert(150, c)
        .unwrap()
        .is_accepted());
    let nested_diff = s.diverge(&alternate, 149, a);
    assert_eq!(nested_diff.parent(), Some(alternate.id()));

    let nested = s.engine.register_universe(&nested_diff).unwrap();
    assert_eq!(s.engine.timelines().len(), 3);

    let mut timeline = s.engine.continuity(&nested, s.entity).unwrap();
    assert_eq!(timeline.measure_position(149).unwrap(), Some(a));
    assert_eq!(
        timeline.state_at_or_before(50).unwrap(),
        StateVector::from_definite_state(a.state(), 3)
    );
    assert_eq!(
        timeline.state_at_or_before(120).unwrap(),
        StateVector::from_definite_state(a.state(), 3)
    );
}

#[test]
fn tampered_diffs_are_rejected_without_branching() {
    let mut s = scenario(8);
    let root = s.engine.root_universe();
    let a = s.a;
    let diff = s.diverge(&root, 99, a);

    let mut document = serde_json::to_value(&diff).unwrap();
    document["catalyzing_state"]["state"] = serde_json::json!(7);
    let out_of_range: Diff = serde_json::from_value(document).unwrap();

    let err = s.engine.register_universe(&out_of_range).unwrap_err();
    assert!(matches!(err, TimelineError::UnknownState { .. }));
    assert_eq!(s.engine.timelines().len(), 1);
    assert!(s.engine.universe(out_of_range.id()).is_none());

    // The untouched diff still registers.
    assert!(s.engine.register_universe(&diff).is_ok());
}
