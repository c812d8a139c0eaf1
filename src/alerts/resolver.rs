use crate::alerts::types::AlertType;

/// Auxiliary vision flags that can escalate a base alert type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuxFlags {
    pub multi_subject: bool,
    pub subject_count: u32,
    pub special_condition: bool,
}

/// Map a base type and auxiliary flags onto the concrete alert type
pub fn resolve(base: AlertType, flags: AuxFlags) -> AlertType {
    if flags.special_condition {
        return AlertType::EggsOrBabies;
    }

    if flags.multi_subject || flags.subject_count > 1 {
        return if base.is_in_container() {
            AlertType::TwoOwlsInBox
        } else {
            AlertType::TwoOwls
        };
    }

    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_condition_wins() {
        for base in AlertType::ALL {
            let flags = AuxFlags {
                multi_subject: true,
                subject_count: 3,
                special_condition: true,
            };
            assert_eq!(resolve(base, flags), AlertType::EggsOrBabies);
        }
    }

    #[test]
    fn test_multi_subject_variants() {
        let by_flag = AuxFlags {
            multi_subject: true,
            ..AuxFlags::default()
        };
        let by_count = AuxFlags {
            subject_count: 2,
            ..AuxFlags::default()
        };

        assert_eq!(resolve(AlertType::OwlInBox, by_flag), AlertType::TwoOwlsInBox);
        assert_eq!(resolve(AlertType::OwlInBox, by_count), AlertType::TwoOwlsInBox);
        assert_eq!(resolve(AlertType::OwlOnBox, by_flag), AlertType::TwoOwls);
        assert_eq!(resolve(AlertType::OwlInArea, by_count), AlertType::TwoOwls);
    }

    #[test]
    fn test_single_subject_keeps_base() {
        let single = AuxFlags {
            subject_count: 1,
            ..AuxFlags::default()
        };
        for base in AlertType::ALL {
            assert_eq!(resolve(base, single), base);
        }
    }
}
