//! Prompt templates
//!
//! Every model call uses one fixed template; inputs are spliced between `##`
//! delimiters so the model can tell instructions from data.

pub fn initial_sql_prompt(question: &str, table_schema: &str) -> String {
    format!(
        r#"Write one valid SQL query in Databricks SQL syntax that answers the user's question.
Use fully qualified table names, correct data types and clean joins.

SCHEMA: ## {table_schema} ##
QUESTION: ## {question} ##

Return only the SQL code in a ```sql block."#
    )
}

pub fn cte_follow_up_prompt(question: &str, table_schema: &str, sql_code: &str) -> String {
    format!(
        r#"The SQL below has already been validated. Wrap it in a WITH clause as a common table expression named MASTER.
Then write a new query that selects from MASTER (joining the schema tables if needed) to answer the follow-up question.

SQL_CODE: ## {sql_code} ##
SCHEMA: ## {table_schema} ##
QUESTION: ## {question} ##

Return only the final SQL in a ```sql block."#
    )
}

pub fn repair_prompt(question: &str, sql_code: &str, table_schema: &str, error_msg: &str) -> String {
    format!(
        r#"The SQL query below failed when executed. Fix it using the schema and the error message.
Keep the intent of the original question.

SCHEMA: ## {table_schema} ##
ERROR: ## {error_msg} ##
SQL_CODE: ## {sql_code} ##
QUESTION: ## {question} ##

Return only the corrected SQL in a ```sql block."#
    )
}

pub fn analysis_questions_prompt(table_schema: &str, format_instructions: &str) -> String {
    format!(
        r#"Study the SCHEMA below (delimited by ##) and the relationships between its tables.
Propose the top 3 practical "quick analysis" questions a product manager, data analyst or business stakeholder would ask day to day.

Each question must:
- follow from the structure and relationships of the schema
- be answerable with Databricks SQL
- target an actionable insight (user behaviour, conversion, operational efficiency, revenue)
- not be numbered

SCHEMA:
##
{table_schema}
##

{format_instructions}"#
    )
}

pub fn erd_prompt(table_schema: &str) -> String {
    format!(
        r#"You design Entity Relationship Diagrams for relational databases.

Produce valid Mermaid erDiagram code for the tables below. Include every table, its columns with data types, and every relationship you can justify from column names.

The schema is a JSON object (delimited by ##): keys are table names, values are lists of "column : type".

##
{table_schema}
##

Return only the Mermaid code in a ```mermaid block."#
    )
}
