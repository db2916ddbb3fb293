#![allow(clippy::unwrap_used)]

//! End-to-end flow of a typical service binding against a mock API: derived
//! create options, create, read, list across pages, delete and wait for the
//! resource to disappear.

use std::ops::ControlFlow;
use std::time::Duration;

use httpmock::prelude::*;
use serde::Deserialize;
use serde_json::json;
use stratus_core::{
    CloudError, CreateResult, DeleteResult, FilterConstraint, GetResult, NOT_FOUND_STATE,
    PageKind, Pager, RequestOptions, RequestOpts, ServiceClient, StateChangeConf, filter_list,
    to_request_body,
};

#[derive(RequestOptions)]
#[options(wrap = "vpc")]
struct CreateVpcOpts {
    #[options(required)]
    name: String,
    #[options(required)]
    cidr: String,
    #[options(omit_zero)]
    description: Option<String>,
    #[options(omit_zero)]
    enterprise_project_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, serde::Serialize)]
struct Vpc {
    id: String,
    name: String,
    cidr: String,
    status: String,
}

fn client_for(server: &MockServer) -> ServiceClient {
    ServiceClient::builder()
        .base_url(format!("{}/v1", server.base_url()))
        .project_id("proj-1")
        .allow_insecure_http()
        .static_token("tok-1")
        .build()
        .unwrap()
}

fn vpc_json(id: &str, name: &str, status: &str) -> serde_json::Value {
    json!({"id": id, "name": name, "cidr": "10.0.0.0/16", "status": status})
}

#[tokio::test]
async fn create_read_list_delete() {
    let server = MockServer::start();
    let client = client_for(&server);

    let create_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/proj-1/vpcs")
            .header("x-auth-token", "tok-1")
            .header("content-type", "application/json")
            .json_body(json!({"vpc": {"name": "main", "cidr": "10.0.0.0/16"}}));
        then.status(200)
            .json_body(json!({"vpc": vpc_json("v-1", "main", "CREATING")}));
    });
    let mut get_mock = server.mock(|when, then| {
        when.method(GET).path("/v1/proj-1/vpcs/v-1");
        then.status(200)
            .json_body(json!({"vpc": vpc_json("v-1", "main", "OK")}));
    });
    let base = server.base_url();
    let list_first = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/proj-1/vpcs")
            .query_param_missing("marker");
        then.status(200).json_body(json!({
            "vpcs": [vpc_json("v-0", "legacy", "OK"), vpc_json("v-1", "main", "OK")],
            "vpcs_links": [{"rel": "next", "href": format!("{base}/v1/proj-1/vpcs?marker=v-1")}],
        }));
    });
    let list_second = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/proj-1/vpcs")
            .query_param("marker", "v-1");
        then.status(200).json_body(json!({
            "vpcs": [vpc_json("v-2", "edge", "ERROR")],
        }));
    });
    let delete_mock = server.mock(|when, then| {
        when.method(DELETE).path("/v1/proj-1/vpcs/v-1");
        then.status(204);
    });

    // create
    let opts = CreateVpcOpts {
        name: "main".to_owned(),
        cidr: "10.0.0.0/16".to_owned(),
        description: None,
        enterprise_project_id: String::new(),
    };
    let body = to_request_body(&opts).unwrap();
    let created: CreateResult<Vpc> = CreateResult::new(
        client
            .post(&client.service_url(&["vpcs"]), &body, &RequestOpts::new())
            .await,
        "vpc",
    );
    let created = created.extract().unwrap();
    assert_eq!(created.status, "CREATING");
    create_mock.assert();

    // wait until usable
    let vpc_url = client.service_url(&["vpcs", created.id.as_str()]);
    let state = StateChangeConf::new(["CREATING"], ["OK"])
        .with_interval(Duration::from_millis(10))
        .with_timeout(Duration::from_secs(5))
        .wait(|| async {
            let vpc: Vpc = GetResult::new(client.get(&vpc_url, &RequestOpts::new()).await, "vpc")
                .extract()?;
            Ok(vpc.status)
        })
        .await
        .unwrap();
    assert_eq!(state, "OK");

    // list every page, then narrow client-side
    let pager = Pager::new(
        &client,
        client.service_url(&["vpcs"]),
        "vpcs",
        PageKind::Linked { limit: None },
    );
    let all: Vec<Vpc> = pager.all_pages().await.unwrap().items().unwrap();
    assert_eq!(all.len(), 3);
    let healthy = filter_list(&all, &[FilterConstraint::new("status", "OK")]).unwrap();
    assert_eq!(healthy.len(), 2);
    list_first.assert();
    list_second.assert();

    let mut first_page_ids = Vec::new();
    pager
        .each_page(|page| {
            first_page_ids.extend(page.items::<Vpc>()?.into_iter().map(|v| v.id));
            Ok(ControlFlow::Break(()))
        })
        .await
        .unwrap();
    assert_eq!(first_page_ids, ["v-0", "v-1"]);

    // delete and wait for the resource to go away
    let deleted: DeleteResult = DeleteResult::new(
        client.delete(&vpc_url, &RequestOpts::new()).await,
        "",
    );
    deleted.extract_err().unwrap();
    delete_mock.assert();

    get_mock.delete();
    let gone_mock = server.mock(|when, then| {
        when.method(GET).path("/v1/proj-1/vpcs/v-1");
        then.status(404)
            .json_body(json!({"error_msg": "vpc v-1 not found", "error_code": "VPC.0202"}));
    });
    let state = StateChangeConf::new(["OK", "PENDING_DELETE"], [NOT_FOUND_STATE])
        .with_interval(Duration::from_millis(10))
        .with_timeout(Duration::from_secs(5))
        .wait(|| async {
            let vpc: Vpc = GetResult::new(client.get(&vpc_url, &RequestOpts::new()).await, "vpc")
                .extract()?;
            Ok(vpc.status)
        })
        .await
        .unwrap();
    assert_eq!(state, NOT_FOUND_STATE);
    gone_mock.assert();
}

#[test]
fn missing_required_option_never_reaches_the_wire() {
    let server = MockServer::start();
    let create_mock = server.mock(|when, then| {
        when.method(POST).path("/v1/proj-1/vpcs");
        then.status(200);
    });

    let opts = CreateVpcOpts {
        name: "main".to_owned(),
        cidr: String::new(),
        description: Some("no cidr".to_owned()),
        enterprise_project_id: String::new(),
    };
    let err = to_request_body(&opts).unwrap_err();
    assert!(matches!(err, CloudError::InvalidRequest { ref field, .. } if field == "cidr"));
    assert_eq!(create_mock.calls(), 0);
}

#[tokio::test]
async fn remote_error_carries_service_message() {
    let server = MockServer::start();
    let client = client_for(&server);
    server.mock(|when, then| {
        when.method(POST).path("/v1/proj-1/vpcs");
        then.status(409)
            .json_body(json!({"error": {"message": "CIDR overlaps with vpc v-0"}}));
    });

    let err = client
        .post(
            &client.service_url(&["vpcs"]),
            &json!({"vpc": {"name": "dup", "cidr": "10.0.0.0/16"}}),
            &RequestOpts::new(),
        )
        .await
        .unwrap_err();
    let remote = err.remote().unwrap();
    assert_eq!(remote.status.as_u16(), 409);
    assert_eq!(remote.message().as_deref(), Some("CIDR overlaps with vpc v-0"));
    assert!(!err.is_retriable());
}
