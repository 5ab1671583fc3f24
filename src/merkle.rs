use super::*;

/// Merkle root over internal-order txids, bitcoin style: pair up with
/// sha256d, duplicating the last node on odd levels.
pub(crate) fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    match leaves {
        [] => [0; 32],
        [root] => *root,
        _ => {
            let mut level = leaves.to_vec();

            while level.len() > 1 {
                level = level
                    .chunks(2)
                    .map(|pair| {
                        let mut data = [0u8; 64];
                        data[..32].copy_from_slice(&pair[0]);
                        data[32..].copy_from_slice(pair.get(1).unwrap_or(&pair[0]));
                        sha256d::Hash::hash(&data).to_byte_array()
                    })
                    .collect();
            }

            level[0]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> [u8; 32] {
        [n; 32]
    }

    #[test]
    fn empty_is_zero() {
        assert_eq!(merkle_root(&[]), [0; 32]);
    }

    #[test]
    fn single_leaf_is_the_root() {
        assert_eq!(merkle_root(&[leaf(7)]), leaf(7));
    }

    #[test]
    fn pair_hashes_concatenation() {
        let mut data = [0u8; 64];
        data[..32].copy_from_slice(&leaf(1));
        data[32..].copy_from_slice(&leaf(2));
        let expected = sha256d::Hash::hash(&data).to_byte_array();

        assert_eq!(merkle_root(&[leaf(1), leaf(2)]), expected);
    }

    #[test]
    fn odd_level_duplicates_last() {
        // three leaves: the third pairs with itself
        let root_of_three = merkle_root(&[leaf(1), leaf(2), leaf(3)]);
        let root_of_four = merkle_root(&[leaf(1), leaf(2), leaf(3), leaf(3)]);
        assert_eq!(root_of_three, root_of_four);
    }

    #[test]
    fn order_matters() {
        assert_ne!(
            merkle_root(&[leaf(1), leaf(2)]),
            merkle_root(&[leaf(2), leaf(1)])
        );
    }
}
