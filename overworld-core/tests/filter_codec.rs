use overworld_core::filters::{
    ABILITIES, GENDERS, MARKS, NATURES, SCALES, SHININESS, SLOTS, decode_bit_array,
    decode_bitfield, encode_bit_array, encode_bitfield,
};
use overworld_core::{FilterKind, FilterSelection, Filters, Iv, IvRange, OptionTable};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const SINGLE_WORD: [&OptionTable; 6] = [&ABILITIES, &SHININESS, &SLOTS, &NATURES, &GENDERS, &SCALES];

fn random_subset(rng: &mut ChaCha8Rng, table: &OptionTable) -> Vec<u8> {
    table
        .options
        .iter()
        .map(|o| o.index)
        .filter(|_| rng.gen_bool(0.4))
        .collect()
}

#[test]
fn single_word_selections_survive_encoding() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
    for table in SINGLE_WORD {
        for _ in 0..64 {
            let selection = random_subset(&mut rng, table);
            let word = encode_bitfield(table, &selection).unwrap();
            assert_eq!(decode_bitfield(table, word), selection, "{}", table.name);
        }
        let everything: Vec<u8> = table.options.iter().map(|o| o.index).collect();
        let word = encode_bitfield(table, &everything).unwrap();
        assert_eq!(word.count_ones() as usize, everything.len());
    }
}

#[test]
fn mark_selections_survive_two_word_encoding() {
    let mut rng = ChaCha8Rng::seed_from_u64(45);
    for _ in 0..256 {
        let selection = random_subset(&mut rng, &MARKS);
        let words = encode_bit_array(&MARKS, &selection).unwrap();
        assert_eq!(decode_bit_array(&MARKS, words), selection);
    }

    let low = encode_bit_array(&MARKS, &[0]).unwrap();
    let high = encode_bit_array(&MARKS, &[33]).unwrap();
    assert_eq!(low, [1, 0]);
    assert_eq!(high, [0, 2]);
    assert_eq!(encode_bit_array(&MARKS, &[0, 33]).unwrap(), [1, 2]);
}

#[test]
fn selection_recompiles_from_scratch() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut selection = FilterSelection::new();
    for _ in 0..128 {
        let kind = FilterKind::ALL[rng.gen_range(0..FilterKind::ALL.len())];
        let table = kind.table();
        let option = table.options[rng.gen_range(0..table.options.len())].index;
        if rng.gen_bool(0.5) {
            selection.select(kind, option).unwrap();
        } else {
            selection.deselect(kind, option).unwrap();
        }
    }

    let mut rebuilt = FilterSelection::new();
    for kind in FilterKind::ALL {
        rebuilt.set(kind, &selection.selected(kind)).unwrap();
    }
    assert_eq!(rebuilt.filters(), selection.filters());

    let filters: &Filters = selection.filters();
    assert_eq!(
        decode_bit_array(&MARKS, filters.marks),
        selection.selected(FilterKind::Marks)
    );
    assert_eq!(
        decode_bitfield(&NATURES, filters.natures),
        selection.selected(FilterKind::Natures)
    );
}

#[test]
fn iv_bounds_are_inclusive() {
    let all = |v: u8| [v; 6].map(|x| Iv::new(x).unwrap());
    let range = IvRange::default();
    assert!(range.accepts(&all(0)));
    assert!(range.accepts(&all(31)));
    assert!(Iv::new(32).is_err());

    let mut selection = FilterSelection::new();
    selection.set_iv_range(0, 31, 31).unwrap();
    assert_eq!(selection.filters().iv_min[0], 31);
    assert!(!selection.ivs().accepts(&all(30)));
    assert!(selection.ivs().accepts(&all(31)));
}
