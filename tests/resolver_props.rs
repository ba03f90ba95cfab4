//! Property tests: sender resolution depends only on directory content,
//! never on load order or call history.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use mailtriage::directory::Directory;
use mailtriage::model::directory::{Group, Pic};

const SENDER: &str = "a@gmail.com";

fn group(id: u8, member: bool) -> Group {
    let members: BTreeSet<String> = if member {
        [SENDER.to_string()].into_iter().collect()
    } else {
        ["someone@else.com".to_string()].into_iter().collect()
    };
    Group {
        id: format!("g{id:02}"),
        name: format!("Group {id}"),
        members,
        pic: None,
        pic_email: None,
    }
}

fn pic(id: u8, leads: u8) -> Pic {
    Pic {
        id: format!("p{id:02}"),
        name: format!("Person {id}"),
        email: format!("p{id}@corp.com"),
        group_leaderships: [format!("g{leads:02}")].into_iter().collect(),
    }
}

fn directory_specs() -> impl Strategy<Value = (Vec<(u8, bool)>, Vec<(u8, u8)>)> {
    (
        prop::collection::btree_map(0u8..40, any::<bool>(), 0..12),
        prop::collection::btree_map(0u8..40, 0u8..40, 0..12),
    )
        .prop_map(|(groups, pics): (BTreeMap<u8, bool>, BTreeMap<u8, u8>)| {
            (groups.into_iter().collect(), pics.into_iter().collect())
        })
}

proptest! {
    #[test]
    fn resolution_ignores_load_order(
        (specs, shuffled) in directory_specs().prop_flat_map(|specs| {
            let groups = Just(specs.0.clone()).prop_shuffle();
            let pics = Just(specs.1.clone()).prop_shuffle();
            (Just(specs), (groups, pics))
        })
    ) {
        let build = |groups: &[(u8, bool)], pics: &[(u8, u8)]| {
            Directory::new(
                groups.iter().map(|&(id, m)| group(id, m)).collect(),
                pics.iter().map(|&(id, g)| pic(id, g)).collect(),
            )
        };
        let ordered = build(&specs.0, &specs.1);
        let reordered = build(&shuffled.0, &shuffled.1);

        let first = ordered.resolve(SENDER);
        prop_assert_eq!(&first, &reordered.resolve(SENDER));
        prop_assert_eq!(&first, &ordered.resolve(SENDER));

        let group_a = ordered.resolve_group(SENDER).map(|g| g.id.clone());
        let group_b = reordered.resolve_group(SENDER).map(|g| g.id.clone());
        prop_assert_eq!(&group_a, &group_b);

        // The lowest matching id always wins.
        let expected = specs
            .0
            .iter()
            .filter(|(_, m)| *m)
            .map(|(id, _)| format!("g{id:02}"))
            .min();
        prop_assert_eq!(group_a, expected);
    }
}
