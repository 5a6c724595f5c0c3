mod common;

use std::sync::Arc;

use common::{child, document, registry, scalar};
use flow_core::{
    get_field, set_field, transaction, transaction_many, Datum, Error, FieldValue, Model, PeerId,
    Phase, Root, ScopeError, Transaction, TransactionStateError,
};

fn state_error(result: flow_core::Result<()>) -> TransactionStateError {
    match result {
        Err(Error::TransactionState(err)) => err,
        other => panic!("expected a transaction state error, got {other:?}"),
    }
}

#[test]
fn leaf_write_rebuilds_ancestors_and_shares_siblings() {
    let registry = registry();
    let root = document(&registry);
    let model = root.model().clone();
    let left = child(&model, "left");
    let leaf = child(&left, "leaf");
    let right = child(&model, "right");

    let updated = transaction(&root, |_| {
        set_field(&leaf, "count", Datum::Long(10))?;
        Ok(())
    })
    .unwrap();

    let new_model = updated.model();
    let new_left = child(new_model, "left");
    let new_leaf = child(&new_left, "leaf");
    assert!(!Arc::ptr_eq(new_model, &model));
    assert!(!Arc::ptr_eq(&new_left, &left));
    assert!(!Arc::ptr_eq(&new_leaf, &leaf));
    assert!(Arc::ptr_eq(&child(new_model, "right"), &right));

    assert_eq!(new_model.object_id(), model.object_id());
    assert_eq!(new_left.object_id(), left.object_id());
    assert_eq!(new_leaf.object_id(), leaf.object_id());
    assert_eq!(scalar(&new_leaf, "count"), Datum::Long(10));
    assert_eq!(scalar(&leaf, "count"), Datum::Long(1));
    updated.index().validate_invariants(new_model).unwrap();
}

#[test]
fn transaction_without_writes_returns_the_same_root() {
    let registry = registry();
    let root = document(&registry);
    let updated = transaction(&root, |_| Ok(())).unwrap();
    assert!(Arc::ptr_eq(updated.model(), root.model()));
    assert!(updated.index().ptr_eq(root.index()));
}

#[test]
fn second_transaction_cannot_enter_on_the_same_thread() {
    let registry = registry();
    let first = document(&registry);
    let second = document(&registry);

    let result = transaction(&first, |_| {
        let other = Transaction::new(vec![second.clone()]);
        assert_eq!(
            state_error(other.enter()),
            TransactionStateError::AlreadyInTransaction
        );
        let overlapping = Transaction::new(vec![first.clone()]);
        assert_eq!(
            state_error(overlapping.enter()),
            TransactionStateError::AlreadyInTransaction
        );
        assert_eq!(overlapping.phase(), Phase::NotEntered);
        Ok(())
    });
    assert!(result.is_ok());
}

#[test]
fn exit_must_come_from_the_current_transaction() {
    let registry = registry();
    let root = document(&registry);
    let first = Transaction::new(vec![root.clone()]);
    let second = Transaction::new(vec![root]);

    first.enter().unwrap();
    second.enter().unwrap_err();
    assert_eq!(state_error(second.exit()), TransactionStateError::NotEntered);
    first.exit().unwrap();
    assert_eq!(state_error(first.enter()), TransactionStateError::AlreadyExited);
    assert_eq!(state_error(first.exit()), TransactionStateError::AlreadyExited);
    assert!(Transaction::current().is_none());
}

#[test]
fn writes_outside_a_transaction_always_fail() {
    let registry = registry();
    let root = document(&registry);
    let model = root.model().clone();
    for _ in 0..3 {
        assert!(matches!(
            set_field(&model, "title", Datum::from("nope")),
            Err(Error::Scope(ScopeError::NoTransaction))
        ));
    }
    assert_eq!(scalar(&model, "title"), Datum::from("hello"));
    assert!(model.clock().is_empty());
}

#[test]
fn clock_advances_by_one_per_write() {
    let registry = registry();
    let mut root = document(&registry);
    let peer = PeerId([7; 16]);
    let id = root.model().object_id();

    let mut expected = 0;
    for round in 0..3 {
        let model = root.model().clone();
        root = Transaction::with_peer(vec![root.clone()], peer)
            .run(|_| {
                for i in 0..4 {
                    let written = set_field(&model, "title", Datum::from(format!("{round}-{i}")))?;
                    expected += 1;
                    assert_eq!(written.clock().get(&peer), expected);
                }
                Ok(())
            })
            .unwrap()
            .remove(0);
    }

    let model = root.model();
    assert_eq!(model.object_id(), id);
    assert_eq!(model.clock().get(&peer), 12);
    match model.field("title") {
        Some(FieldValue::Versioned(versioned)) => {
            let stamp = versioned.version.unwrap();
            assert_eq!(stamp.last_writer, peer);
            assert_eq!(stamp.clock_sum, 12);
        }
        other => panic!("expected a versioned title, got {other:?}"),
    }
}

#[test]
fn reads_inside_a_transaction_see_pending_writes() {
    let registry = registry();
    let root = document(&registry);
    let model = root.model().clone();

    transaction(&root, |txn| {
        set_field(&model, "title", Datum::from("draft"))?;
        let title = get_field(&model, "title")?;
        assert_eq!(title, Some(FieldValue::Scalar(Datum::from("draft"))));
        assert_eq!(txn.updated(&model)?.object_id(), model.object_id());
        Ok(())
    })
    .unwrap();

    let title = get_field(&model, "title").unwrap();
    assert_eq!(title, Some(FieldValue::Scalar(Datum::from("hello"))));
    assert!(matches!(get_field(&model, "missing"), Err(Error::InvalidField(_))));
}

#[test]
fn unversioned_and_unknown_fields_cannot_be_written() {
    let registry = registry();
    let root = document(&registry);
    let model = root.model().clone();

    transaction(&root, |_| {
        assert!(matches!(
            set_field(&model, "tags", Datum::Null),
            Err(Error::InvalidField(_))
        ));
        assert!(matches!(
            set_field(&model, "nope", Datum::Null),
            Err(Error::InvalidField(_))
        ));
        Ok(())
    })
    .unwrap();
}

#[test]
fn objects_outside_the_bound_roots_are_rejected() {
    let registry = registry();
    let inside = document(&registry);
    let outside = document(&registry);
    let stranger = child(outside.model(), "left");

    transaction(&inside, |txn| {
        assert!(matches!(
            set_field(&stranger, "label", Datum::from("x")),
            Err(Error::Scope(ScopeError::NotInTree(_)))
        ));
        let detached = Arc::new(Model::new(stranger.descriptor().clone()));
        assert!(matches!(
            txn.set_latest_model(detached),
            Err(Error::Scope(ScopeError::NotInTree(_)))
        ));
        Ok(())
    })
    .unwrap();
}

#[test]
fn ancestor_chain_must_end_at_a_bound_root() {
    let registry = registry();
    let root = document(&registry);
    let left = child(root.model(), "left");
    let right = child(root.model(), "right");
    // re-rooting at `left` keeps the document's other entries from the baseline index
    let rerooted = Root::from_update(left.clone(), &root);
    assert!(rerooted.index().contains(&right.object_id()));

    let updated = transaction(&rerooted, |txn| {
        let relabeled = Arc::new(right.with_initial_value("label", Datum::from("x"))?);
        assert!(matches!(
            txn.set_latest_model(relabeled),
            Err(Error::Scope(ScopeError::OutsideScope(_)))
        ));
        set_field(&child(&left, "leaf"), "count", Datum::Long(3))?;
        Ok(())
    })
    .unwrap();
    assert_eq!(scalar(&child(updated.model(), "leaf"), "count"), Datum::Long(3));
    assert!(Arc::ptr_eq(&child(root.model(), "right"), &right));
}

#[test]
fn block_errors_release_the_thread_and_discard_writes() {
    let registry = registry();
    let root = document(&registry);
    let model = root.model().clone();

    let result = transaction(&root, |_| {
        set_field(&model, "title", Datum::from("lost"))?;
        Err(Error::InvalidField("abort".into()))
    });
    assert!(matches!(result, Err(Error::InvalidField(_))));
    assert!(Transaction::current().is_none());
    assert_eq!(scalar(&model, "title"), Datum::from("hello"));

    // the thread can run another transaction afterwards
    transaction(&root, |_| Ok(())).unwrap();
}

#[test]
fn panics_inside_the_block_still_exit() {
    let registry = registry();
    let root = document(&registry);
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = transaction(&root, |_| panic!("boom"));
    }));
    assert!(outcome.is_err());
    assert!(Transaction::current().is_none());
}

#[test]
fn propagation_settles_each_object_once() {
    let registry = registry();
    let root = document(&registry);
    let model = root.model().clone();
    let left = child(&model, "left");
    let leaf = child(&left, "leaf");

    let txn = Transaction::new(vec![root.clone()]);
    txn.enter().unwrap();
    txn.write_field(&leaf, "count", Datum::Long(5).into()).unwrap();
    assert!(txn.is_dirty(&left.object_id()));
    assert!(txn.is_dirty(&model.object_id()));
    assert!(!txn.is_dirty(&leaf.object_id()));

    let first = txn.updated_root(&model).unwrap();
    let second = txn.updated_root(&model).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(!txn.is_dirty(&model.object_id()));

    // a later write re-opens the chain
    txn.write_field(&leaf, "count", Datum::Long(6).into()).unwrap();
    let third = txn.updated_root(&model).unwrap();
    assert!(!Arc::ptr_eq(&second, &third));
    txn.exit().unwrap();

    // still callable after exit
    let after_exit = txn.updated_root(&model).unwrap();
    assert!(Arc::ptr_eq(&third, &after_exit));
    assert_eq!(
        scalar(&child(&child(&after_exit, "left"), "leaf"), "count"),
        Datum::Long(6)
    );
}

#[test]
fn nested_models_written_in_are_adopted() {
    let registry = registry();
    let root = document(&registry);
    let model = root.model().clone();
    let right = child(&model, "right");
    let leaf_descriptor = child(&right, "leaf").descriptor().clone();

    let fresh_leaf = Arc::new(
        Model::new(leaf_descriptor)
            .with_initial_value("count", Datum::Long(100))
            .unwrap(),
    );
    let updated = transaction(&root, |_| {
        set_field(&right, "leaf", fresh_leaf.clone())?;
        set_field(&fresh_leaf, "count", Datum::Long(101))?;
        Ok(())
    })
    .unwrap();

    let new_leaf = child(&child(updated.model(), "right"), "leaf");
    assert_eq!(new_leaf.object_id(), fresh_leaf.object_id());
    assert_eq!(scalar(&new_leaf, "count"), Datum::Long(101));
    updated.index().validate_invariants(updated.model()).unwrap();
}

#[test]
fn multiple_roots_commit_in_declaration_order() {
    let registry = registry();
    let a = document(&registry);
    let b = document(&registry);
    let b_model = b.model().clone();

    let roots = transaction_many(&[a.clone(), b.clone()], |_| {
        set_field(&b_model, "title", Datum::from("b"))?;
        Ok(())
    })
    .unwrap();

    assert_eq!(roots.len(), 2);
    assert!(Arc::ptr_eq(roots[0].model(), a.model()));
    assert_eq!(roots[1].model().object_id(), b_model.object_id());
    assert_eq!(scalar(roots[1].model(), "title"), Datum::from("b"));
}

#[test]
fn handles_from_before_a_commit_write_onto_the_committed_instance() {
    let registry = registry();
    let root = document(&registry);
    let peer = PeerId([3; 16]);
    let left = child(root.model(), "left");
    let leaf = child(&left, "leaf");

    let first = Transaction::with_peer(vec![root.clone()], peer)
        .run(|_| {
            set_field(&leaf, "count", Datum::Long(99))?;
            Ok(())
        })
        .unwrap()
        .remove(0);

    let second = Transaction::with_peer(vec![first.clone()], peer)
        .run(|_| {
            assert_eq!(
                get_field(&leaf, "count")?,
                Some(FieldValue::Scalar(Datum::Long(99)))
            );
            set_field(&left, "label", Datum::from("relabeled"))?;
            let written = set_field(&leaf, "count", Datum::Long(100))?;
            assert_eq!(written.clock().get(&peer), 2);
            Ok(())
        })
        .unwrap()
        .remove(0);

    let new_left = child(second.model(), "left");
    let new_leaf = child(&new_left, "leaf");
    assert_eq!(scalar(&new_left, "label"), Datum::from("relabeled"));
    assert_eq!(new_left.clock().get(&peer), 1);
    assert_eq!(scalar(&new_leaf, "count"), Datum::Long(100));
    assert_eq!(new_leaf.clock().get(&peer), 2);
    second.index().validate_invariants(second.model()).unwrap();
}

#[test]
fn writes_through_a_stale_handle_keep_earlier_commits() {
    let registry = registry();
    let root = document(&registry);
    let model = root.model().clone();
    let left = child(&model, "left");
    let leaf = child(&left, "leaf");

    let first = transaction(&root, |_| {
        set_field(&leaf, "count", Datum::Long(99))?;
        Ok(())
    })
    .unwrap();
    let second = transaction(&first, |_| {
        set_field(&left, "label", Datum::from("changed"))?;
        set_field(&model, "title", Datum::from("renamed"))?;
        Ok(())
    })
    .unwrap();

    assert_eq!(scalar(second.model(), "title"), Datum::from("renamed"));
    let new_left = child(second.model(), "left");
    assert_eq!(scalar(&new_left, "label"), Datum::from("changed"));
    assert_eq!(scalar(&child(&new_left, "leaf"), "count"), Datum::Long(99));
}
