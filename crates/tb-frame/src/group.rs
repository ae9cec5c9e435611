//! Grouping metadata, the fold protocol, and `summarize`.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::rc::Rc;

use tb_columnar::{GroupKey, Row};
use tb_types::Scalar;
use tracing::{debug, trace};

use crate::summary::{RunningFold, Summaries, Summarize};
use crate::{Dataframe, FrameError};

/// Result of one fold pass: groups in first-encounter order, plus the
/// group each input row landed in.
#[derive(Debug)]
pub(crate) struct Folded {
    pub(crate) groups: Vec<FoldedGroup>,
    pub(crate) row_groups: Vec<usize>,
}

#[derive(Debug)]
pub(crate) struct FoldedGroup {
    /// Group-column values taken from the group's first row.
    pub(crate) key_values: Vec<Scalar>,
    pub(crate) results: Vec<Scalar>,
}

struct OpenGroup<'a> {
    key_values: Vec<Scalar>,
    folds: Vec<Box<dyn RunningFold + 'a>>,
}

impl Dataframe {
    /// Appends `names` to the grouping columns. The data is shared, not copied.
    pub fn group_by<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, FrameError> {
        let mut groups: Vec<String> = self.groups.to_vec();
        for name in names {
            let name = name.as_ref();
            if !self.has_column(name) {
                return Err(FrameError::MissingColumn(name.to_owned()));
            }
            if groups.iter().any(|group| group == name) {
                return Err(FrameError::DuplicateGroup(name.to_owned()));
            }
            groups.push(name.to_owned());
        }
        debug!(groups = ?groups, "group_by");
        Ok(Self {
            groups: groups.into(),
            ..self.clone()
        })
    }

    /// Runs every accumulator over every row in a single pass, one state per
    /// accumulator per group, and finalizes each state exactly once.
    pub(crate) fn fold(&self, accumulators: &[&dyn Summarize]) -> Result<Folded, FrameError> {
        let rows = self.rows()?;
        let mut slot = HashMap::<GroupKey, usize>::new();
        let mut open: Vec<OpenGroup<'_>> = Vec::new();
        let mut row_groups = Vec::with_capacity(rows.len());

        for row in rows {
            let key = GroupKey::from_row(row, &self.groups);
            let idx = match slot.entry(key) {
                Entry::Occupied(entry) => *entry.get(),
                Entry::Vacant(entry) => {
                    open.push(OpenGroup {
                        key_values: self.group_values(row),
                        folds: accumulators.iter().map(|acc| acc.begin()).collect(),
                    });
                    *entry.insert(open.len() - 1)
                }
            };
            for fold in &mut open[idx].folds {
                fold.step(row)?;
            }
            row_groups.push(idx);
        }

        trace!(
            rows = rows.len(),
            groups = open.len(),
            accumulators = accumulators.len(),
            "fold pass complete"
        );

        let groups = open
            .into_iter()
            .map(|group| -> Result<FoldedGroup, FrameError> {
                let results = group
                    .folds
                    .into_iter()
                    .map(|fold| fold.finish())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FoldedGroup {
                    key_values: group.key_values,
                    results,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Folded { groups, row_groups })
    }

    fn group_values(&self, row: &Row) -> Vec<Scalar> {
        self.groups
            .iter()
            .map(|group| row.get(group).clone())
            .collect()
    }

    /// One row per group: the group-column values followed by each field's
    /// final value. The result is grouped by all but the last grouping
    /// column, so summarizing again rolls up one level.
    pub fn summarize(&self, fields: &Summaries) -> Result<Self, FrameError> {
        let mut names: Vec<String> = self.groups.to_vec();
        for (name, _) in &fields.fields {
            if names.contains(name) {
                return Err(FrameError::DuplicateColumn(name.clone()));
            }
            names.push(name.clone());
        }

        let accumulators: Vec<&dyn Summarize> =
            fields.fields.iter().map(|(_, acc)| acc.as_ref()).collect();
        let folded = self.fold(&accumulators)?;

        let rows: Vec<Row> = folded
            .groups
            .into_iter()
            .map(|group| {
                let mut row = Row::with_capacity(names.len());
                for (name, value) in self.groups.iter().zip(group.key_values) {
                    row.insert(name.as_str(), value);
                }
                for ((name, _), value) in fields.fields.iter().zip(group.results) {
                    row.insert(name.as_str(), value);
                }
                row
            })
            .collect();

        let remaining = match self.groups.split_last() {
            Some((_, rest)) => Rc::from(rest),
            None => Rc::clone(&self.groups),
        };
        debug!(groups = rows.len(), fields = fields.len(), "summarize");
        Ok(Self::with_rows(rows, names.into(), remaining))
    }
}

#[cfg(test)]
mod tests {
    use tb_columnar::{Row, row};
    use tb_types::Scalar;

    use crate::summary::{Summaries, count, mean, sum};
    use crate::{Dataframe, FrameError};

    fn gapminder() -> Dataframe {
        Dataframe::from_rows(vec![
            row! { "region" => "asia", "country" => "jp", "year" => 2000, "life" => 81.0 },
            row! { "region" => "asia", "country" => "jp", "year" => 2010, "life" => 83.0 },
            row! { "region" => "asia", "country" => "in", "year" => 2000, "life" => 63.0 },
            row! { "region" => "europe", "country" => "fr", "year" => 2000, "life" => 79.0 },
            row! { "region" => "europe", "country" => "fr", "year" => 2010, "life" => 81.0 },
        ])
        .expect("frame")
    }

    #[test]
    fn group_by_appends_levels() {
        let grouped = gapminder()
            .group_by(&["region"])
            .and_then(|frame| frame.group_by(&["country"]))
            .expect("grouped");
        assert_eq!(grouped.group_names(), ["region", "country"]);
    }

    #[test]
    fn group_by_rejects_unknown_and_repeated_columns() {
        let frame = gapminder();
        assert!(matches!(
            frame.group_by(&["planet"]),
            Err(FrameError::MissingColumn(name)) if name == "planet"
        ));
        let grouped = frame.group_by(&["region"]).expect("grouped");
        assert!(matches!(
            grouped.group_by(&["region"]),
            Err(FrameError::DuplicateGroup(name)) if name == "region"
        ));
    }

    #[test]
    fn group_by_shares_the_row_view() {
        let frame = gapminder();
        let grouped = frame.group_by(&["region"]).expect("grouped");
        assert_eq!(
            frame.rows().expect("rows").as_ptr(),
            grouped.rows().expect("rows").as_ptr()
        );
    }

    #[test]
    fn grouped_mean_emits_one_row_per_group() {
        let frame = Dataframe::from_rows(vec![
            row! { "g" => "x", "v" => 1 },
            row! { "g" => "x", "v" => 3 },
            row! { "g" => "y", "v" => 10 },
        ])
        .expect("frame");
        let out = frame
            .group_by(&["g"])
            .and_then(|f| f.summarize(&Summaries::new().with("avg", mean("v"))))
            .expect("summarize");
        let rows = out.rows().expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], row! { "g" => "x", "avg" => 2.0 });
        assert_eq!(rows[1], row! { "g" => "y", "avg" => 10.0 });
        assert!(out.group_names().is_empty());
    }

    #[test]
    fn ungrouped_summary_is_a_single_row() {
        let out = gapminder()
            .summarize(&Summaries::new().with("n", count()).with("years", sum("year")))
            .expect("summarize");
        assert_eq!(out.column_names(), ["n", "years"]);
        assert_eq!(
            out.rows().expect("rows"),
            [row! { "n" => 5, "years" => 10_020 }]
        );
    }

    #[test]
    fn summarize_rolls_up_one_level_at_a_time() {
        let by_country = gapminder()
            .group_by(&["region", "country"])
            .and_then(|f| f.summarize(&Summaries::new().with("life", mean("life"))))
            .expect("country level");
        assert_eq!(by_country.group_names(), ["region"]);
        assert_eq!(by_country.count().expect("count"), 3);
        assert_eq!(by_country.column_names(), ["region", "country", "life"]);

        let by_region = by_country
            .summarize(&Summaries::new().with("countries", count()))
            .expect("region level");
        assert!(by_region.group_names().is_empty());
        let rows = by_region.rows().expect("rows");
        assert_eq!(rows[0], row! { "region" => "asia", "countries" => 2 });
        assert_eq!(rows[1], row! { "region" => "europe", "countries" => 1 });
    }

    #[test]
    fn groups_follow_first_encounter_order() {
        let frame = Dataframe::from_rows(vec![
            row! { "k" => "b" },
            row! { "k" => "a" },
            row! { "k" => "b" },
        ])
        .expect("frame");
        let out = frame
            .group_by(&["k"])
            .and_then(|f| f.summarize(&Summaries::new().with("n", count())))
            .expect("summarize");
        let keys: Vec<&Scalar> = out.rows().expect("rows").iter().map(|r| &r["k"]).collect();
        assert_eq!(keys, [&Scalar::from("b"), &Scalar::from("a")]);
    }

    #[test]
    fn summarize_rejects_field_shadowing_a_group_column() {
        let grouped = gapminder().group_by(&["region"]).expect("grouped");
        let err = grouped
            .summarize(&Summaries::new().with("region", count()))
            .expect_err("shadow");
        assert!(matches!(err, FrameError::DuplicateColumn(name) if name == "region"));
    }

    #[test]
    fn summary_of_empty_frame_has_no_groups() {
        let frame = Dataframe::new(None, Some(Vec::<Row>::new()), Vec::new(), Some(vec!["v".into()]))
            .expect("frame");
        let out = frame
            .summarize(&Summaries::new().with("n", count()))
            .expect("summarize");
        assert_eq!(out.count().expect("count"), 0);
    }

    #[test]
    fn fold_failure_aborts_summarize() {
        let err = gapminder()
            .summarize(&Summaries::new().with("bad", sum("country")))
            .expect_err("text sum");
        assert!(matches!(err, FrameError::Type(_)));
    }
}
