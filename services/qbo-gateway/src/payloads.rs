//! Fixed request bodies sent to the accounting API
//!
//! Each route posts one literal document. Ids such as `CustomerRef`,
//! `VendorRef` and the invoice/bill `Id` refer to records in the sandbox
//! company and must exist there for the call to succeed.

use serde_json::{Value, json};

pub fn account() -> Value {
    json!({
        "Name": "Test_Account_Updated",
        "SubAccount": false,
        "FullyQualifiedName": "Test_Account_Updated",
        "Active": true,
        "Classification": "Asset",
        "AccountType": "Accounts Receivable",
        "AccountSubType": "AccountsReceivable",
        "CurrentBalance": 0,
        "CurrentBalanceWithSubAccounts": 0,
        "CurrencyRef": { "value": "USD", "name": "United States Dollar" },
        "domain": "QBO",
        "sparse": false,
        "Id": "91",
        "SyncToken": "0",
        "MetaData": {
            "CreateTime": "2024-08-12T09:37:38-07:00",
            "LastUpdatedTime": "2024-08-12T09:37:38-07:00"
        }
    })
}

pub fn invoice() -> Value {
    json!({
        "CustomerRef": { "value": "1" },
        "Line": [
            {
                "Amount": 100.00,
                "DetailType": "SalesItemLineDetail",
                "SalesItemLineDetail": {
                    "ItemRef": { "value": "1", "name": "Item Name" },
                    "UnitPrice": 100.00,
                    "Qty": 1
                }
            }
        ],
        "BillAddr": {
            "Line1": "123 Main St",
            "City": "Anytown",
            "CountrySubDivisionCode": "CA",
            "PostalCode": "12345"
        },
        "CurrencyRef": { "value": "USD" }
    })
}

/// Sparse update: only the listed fields change. `SyncToken` must match
/// the invoice's current version or the API rejects the update.
pub fn invoice_update() -> Value {
    json!({
        "Id": "145",
        "SyncToken": "0",
        "sparse": true,
        "Line": [
            {
                "Amount": 150.00,
                "DetailType": "SalesItemLineDetail",
                "SalesItemLineDetail": {
                    "ItemRef": { "value": "1", "name": "Updated Item Name" },
                    "UnitPrice": 150.00,
                    "Qty": 1
                }
            }
        ]
    })
}

pub fn bill() -> Value {
    json!({
        "VendorRef": { "value": "56" },
        "Line": [
            {
                "Amount": 100.00,
                "DetailType": "AccountBasedExpenseLineDetail",
                "AccountBasedExpenseLineDetail": {
                    "AccountRef": { "value": "7" }
                }
            }
        ],
        "CurrencyRef": { "value": "USD" }
    })
}

/// Full (non-sparse) bill update.
pub fn bill_update() -> Value {
    json!({
        "DueDate": "2024-08-12",
        "Balance": 100,
        "domain": "QBO",
        "sparse": false,
        "Id": "146",
        "SyncToken": "0",
        "MetaData": {
            "CreateTime": "2024-08-12T11:55:24-07:00",
            "LastUpdatedTime": "2024-08-12T11:55:24-07:00"
        },
        "TxnDate": "2024-08-12",
        "CurrencyRef": { "value": "USD", "name": "United States Dollar" },
        "Line": [
            {
                "Id": "1",
                "LineNum": 1,
                "Amount": 150,
                "DetailType": "AccountBasedExpenseLineDetail",
                "AccountBasedExpenseLineDetail": {
                    "AccountRef": { "value": "7", "name": "Advertising" },
                    "BillableStatus": "NotBillable",
                    "TaxCodeRef": { "value": "NON" }
                }
            }
        ],
        "VendorRef": { "value": "56", "name": "Bob's Burger Joint" },
        "APAccountRef": { "value": "33", "name": "Accounts Payable (A/P)" },
        "TotalAmt": 100
    })
}

pub fn transfer() -> Value {
    json!({
        "FromAccountRef": { "value": "1" },
        "ToAccountRef": { "value": "2" },
        "Amount": 100.00,
        "TxnDate": "2024-01-01"
    })
}

pub fn vendor() -> Value {
    json!({
        "DisplayName": "Vendor Name",
        "PrimaryEmailAddr": { "Address": "vendor@example.com" },
        "PrimaryPhone": { "FreeFormNumber": "(123) 456-7890" },
        "BillAddr": {
            "Line1": "123 Vendor St",
            "City": "Vendor City",
            "CountrySubDivisionCode": "CA",
            "PostalCode": "12345"
        },
        "Suffix": "Sr. ",
        "Title": "Mr. ",
        "GivenName": "Example 1",
        "PrintOnCheckName": "Example Vendor Name"
    })
}

/// Payment applied against invoice 145.
pub fn payment() -> Value {
    json!({
        "CustomerRef": { "value": "1" },
        "TotalAmt": 100,
        "Line": [
            {
                "Amount": 100.00,
                "LinkedTxn": [ { "TxnId": "145", "TxnType": "Invoice" } ]
            }
        ],
        "CurrencyRef": { "value": "USD" }
    })
}
