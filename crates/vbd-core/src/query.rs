//! Filtering a client's version history.

use serde::Serialize;
use tracing::warn;
use vbd_types::{Client, Contract, QueryOptions};

/// A filter that was accepted but had no effect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "filter", content = "value", rename_all = "snake_case")]
pub enum IgnoredFilter {
    /// Semantic description matching is not implemented.
    Description(String),
}

/// Contracts with at least one matching version, each carrying only the
/// matching versions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ContractQuery {
    pub contracts: Vec<Contract>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<IgnoredFilter>,
}

/// Apply the time range, then the ordinal, to every contract of `client`.
pub fn filter_contracts(client: &Client, options: &QueryOptions) -> ContractQuery {
    let mut ignored = Vec::new();
    if let Some(description) = &options.description {
        warn!(
            client_id = %client.client_id,
            description = %description,
            "description filter is not supported; ignoring it"
        );
        ignored.push(IgnoredFilter::Description(description.clone()));
    }

    let contracts = client
        .contracts
        .iter()
        .filter_map(|contract| {
            let versions: Vec<_> = contract
                .versions()
                .iter()
                .filter(|v| options.time_range.map_or(true, |range| range.matches(v)))
                .filter(|v| options.version_ordinal.map_or(true, |n| v.ordinal() == n))
                .cloned()
                .collect();
            (!versions.is_empty()).then(|| contract.projection(versions))
        })
        .collect();

    ContractQuery { contracts, ignored }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbd_types::{BlobId, BlobIdentifier, ObservedAt, TimeRange, VersionLineageRecord};

    fn ident(raw: &str, at: u64) -> BlobIdentifier {
        BlobIdentifier::new(BlobId::new(raw).unwrap(), ObservedAt::from_millis(at))
    }

    /// K1: b0@10 -> b1@20 -> b2@30, K2: n0@100.
    fn client() -> Client {
        let mut k1 = Contract::new("K1", "lease");
        let v0 = VersionLineageRecord::genesis(ident("b0", 10), "draft");
        let v1 = v0.successor(ident("b1", 20));
        let v2 = v1.successor(ident("b2", 30));
        for v in [v0, v1, v2] {
            k1.append(v).unwrap();
        }
        let mut k2 = Contract::new("K2", "nda");
        k2.append(VersionLineageRecord::genesis(ident("n0", 100), "nda"))
            .unwrap();

        let mut client = Client::new("C1", "Acme");
        client.insert_contract(k1).unwrap();
        client.insert_contract(k2).unwrap();
        client
    }

    fn blob_ids(contract: &Contract) -> Vec<&str> {
        contract
            .versions()
            .iter()
            .map(|v| v.current_blob().id.as_str())
            .collect()
    }

    #[test]
    fn no_filters_returns_everything() {
        let result = filter_contracts(&client(), &QueryOptions::new());
        assert_eq!(result.contracts.len(), 2);
        assert_eq!(blob_ids(&result.contracts[0]), vec!["b0", "b1", "b2"]);
        assert!(result.ignored.is_empty());
    }

    #[test]
    fn time_range_is_inclusive_and_drops_empty_contracts() {
        let options = QueryOptions::new().with_time_range(TimeRange::between(
            ObservedAt::from_millis(15),
            ObservedAt::from_millis(25),
        ));
        let result = filter_contracts(&client(), &options);
        assert_eq!(result.contracts.len(), 1);
        assert_eq!(result.contracts[0].contract_id, "K1");
        assert_eq!(blob_ids(&result.contracts[0]), vec!["b1"]);

        let options = QueryOptions::new().with_time_range(TimeRange::between(
            ObservedAt::from_millis(20),
            ObservedAt::from_millis(30),
        ));
        assert_eq!(
            blob_ids(&filter_contracts(&client(), &options).contracts[0]),
            vec!["b1", "b2"]
        );
    }

    #[test]
    fn open_ended_range() {
        let options = QueryOptions::new().with_time_range(TimeRange {
            after: Some(ObservedAt::from_millis(30)),
            before: None,
        });
        let result = filter_contracts(&client(), &options);
        assert_eq!(result.contracts.len(), 2);
        assert_eq!(blob_ids(&result.contracts[0]), vec!["b2"]);
        assert_eq!(blob_ids(&result.contracts[1]), vec!["n0"]);
    }

    #[test]
    fn ordinal_selects_position_in_lineage() {
        let result = filter_contracts(&client(), &QueryOptions::new().with_ordinal(2));
        assert_eq!(result.contracts.len(), 1);
        assert_eq!(blob_ids(&result.contracts[0]), vec!["b1"]);

        let result = filter_contracts(&client(), &QueryOptions::new().with_ordinal(1));
        assert_eq!(result.contracts.len(), 2);
    }

    #[test]
    fn range_and_ordinal_combine() {
        let options = QueryOptions::new()
            .with_time_range(TimeRange::between(
                ObservedAt::from_millis(0),
                ObservedAt::from_millis(25),
            ))
            .with_ordinal(3);
        assert!(filter_contracts(&client(), &options).contracts.is_empty());
    }

    #[test]
    fn description_is_reported_as_ignored() {
        let options = QueryOptions::new().with_description("signed last week");
        let result = filter_contracts(&client(), &options);
        assert_eq!(result.contracts.len(), 2);
        assert_eq!(
            result.ignored,
            vec![IgnoredFilter::Description("signed last week".into())]
        );
    }
}
